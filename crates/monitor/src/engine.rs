use crate::{alerter::Notifier, models::ResultMap};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{info, warn};

/// Per-run inputs shared by every step.
pub struct RunContext<'a> {
    /// Unix seconds at the start of the run.
    pub now: u64,
    pub notifier: &'a dyn Notifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub ok: bool,
    /// Record to persist under the step's name. `None` leaves the slot as it was.
    pub next: Option<Value>,
}

/// A single independent check run once per invocation.
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &RunContext<'_>, previous: Option<&Value>) -> StepOutcome;
}

/// Typed result of a detector, before it is written into the result map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation<R> {
    pub ok: bool,
    pub next: Option<R>,
}

impl<R> Evaluation<R> {
    pub fn passed(next: R) -> Self {
        Self {
            ok: true,
            next: Some(next),
        }
    }

    pub fn failed(next: Option<R>) -> Self {
        Self { ok: false, next }
    }
}

impl<R: Serialize> Evaluation<R> {
    pub fn into_outcome(self, step: &str) -> StepOutcome {
        let next = self.next.and_then(|record| match serde_json::to_value(&record) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(step, error = %error, "failed to encode step result, keeping previous");
                None
            }
        });
        StepOutcome { ok: self.ok, next }
    }
}

/// Decodes a step's previous record. An unreadable record counts as no history.
pub fn decode_previous<R: DeserializeOwned>(step: &str, previous: Option<&Value>) -> Option<R> {
    let value = previous?;
    match serde_json::from_value(value.clone()) {
        Ok(record) => Some(record),
        Err(error) => {
            warn!(step, error = %error, "discarding unreadable previous result");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineRun {
    pub ok: bool,
    pub results: ResultMap,
}

/// Runs steps in registration order and stops at the first failing one.
#[derive(Default)]
pub struct StepEngine {
    steps: Vec<Box<dyn Step>>,
}

impl StepEngine {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn with_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub async fn run_all(&self, ctx: &RunContext<'_>, previous: &ResultMap) -> EngineRun {
        // Steps skipped by fail-fast keep their history.
        let mut results = previous.clone();

        for step in &self.steps {
            let name = step.name();
            let outcome = step.run(ctx, previous.get(name)).await;

            if let Some(next) = outcome.next {
                results.insert(name.to_owned(), next);
            }

            if !outcome.ok {
                warn!(step = name, "check failed, remaining steps skipped");
                return EngineRun { ok: false, results };
            }
            info!(step = name, "check passed");
        }

        EngineRun { ok: true, results }
    }
}
