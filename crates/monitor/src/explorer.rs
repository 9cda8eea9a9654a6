//! Explorer availability and progress check.
//!
//! Same shape as the heights check but over one counter. A height below the
//! previous one is treated like no progress at all.

use crate::{
    alerter::{AlertLevel, IncidentEvent, report},
    collector::{ExplorerSource, SourceError},
    engine::{Evaluation, RunContext, Step, StepOutcome, decode_previous},
    incident::IncidentLedger,
    models::{ExplorerResult, Outcome},
    timefmt::format_ts,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::warn;

pub const NAME: &str = "explorer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerVerdict {
    TooSoon,
    Stalled,
    Healthy,
}

pub fn classify(
    previous: &ExplorerResult,
    height: u64,
    now: u64,
    min_interval: Duration,
) -> ExplorerVerdict {
    if Duration::from_secs(now.saturating_sub(previous.timestamp)) < min_interval {
        ExplorerVerdict::TooSoon
    } else if height <= previous.sample {
        ExplorerVerdict::Stalled
    } else {
        ExplorerVerdict::Healthy
    }
}

#[derive(Debug, Clone)]
pub struct ExplorerStallDetector {
    min_interval: Duration,
}

impl ExplorerStallDetector {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub async fn evaluate(
        &self,
        ctx: &RunContext<'_>,
        previous: Option<ExplorerResult>,
        height: Result<u64, SourceError>,
    ) -> Evaluation<ExplorerResult> {
        let height = match height {
            Ok(height) => height,
            Err(error) => {
                warn!(error = %error, "failed to read explorer height");
                report(
                    ctx.notifier,
                    AlertLevel::Error,
                    &["Cannot contact explorer, is it up?".to_owned()],
                )
                .await;
                return Evaluation::failed(previous);
            }
        };
        let Some(previous) = previous else {
            ctx.notifier
                .log(&["Explorer check first run, checks skipped.".to_owned()]);
            return Evaluation::passed(ExplorerResult::new(ctx.now, height, Outcome::Success));
        };

        match classify(&previous, height, ctx.now, self.min_interval) {
            ExplorerVerdict::TooSoon => {
                ctx.notifier.log(&[
                    "Not enough time passed, explorer check skipped.".to_owned(),
                    format!("Previous run: {}", format_ts(previous.timestamp)),
                    format!("Current run: {}", format_ts(ctx.now)),
                ]);
                Evaluation::passed(previous)
            }
            ExplorerVerdict::Stalled => self.stalled(ctx, &previous, height).await,
            ExplorerVerdict::Healthy => self.advanced(ctx, &previous, height).await,
        }
    }

    async fn stalled(
        &self,
        ctx: &RunContext<'_>,
        previous: &ExplorerResult,
        height: u64,
    ) -> Evaluation<ExplorerResult> {
        if previous.result != Outcome::ExplorerStalled {
            report(
                ctx.notifier,
                AlertLevel::Error,
                &[
                    format!("Explorer stalled at {height}"),
                    format!("First seen: {} (UTC)", format_ts(previous.timestamp)),
                    "Creating alert in PagerDuty.".to_owned(),
                ],
            )
            .await;
        } else {
            ctx.notifier.log(&[format!("Explorer still at {height}")]);
        }

        let carried = IncidentLedger::carried_key(
            Outcome::ExplorerStalled,
            previous.result,
            previous.incident_key.as_ref(),
        );
        let event = IncidentEvent::new(
            format!("Explorer stalled at {height}"),
            json!({ "height": height }),
        );
        let incident_key = IncidentLedger::new(ctx.notifier).trigger(&event, carried).await;

        Evaluation::failed(Some(
            ExplorerResult::new(ctx.now, height, Outcome::ExplorerStalled)
                .with_incident_key(incident_key),
        ))
    }

    async fn advanced(
        &self,
        ctx: &RunContext<'_>,
        previous: &ExplorerResult,
        height: u64,
    ) -> Evaluation<ExplorerResult> {
        match previous.result {
            Outcome::ExplorerOffline => {
                report(
                    ctx.notifier,
                    AlertLevel::Info,
                    &["Explorer is available again".to_owned()],
                )
                .await;
            }
            Outcome::ExplorerStalled => {
                let message = format!("Explorer advanced from {} to {}", previous.sample, height);
                report(
                    ctx.notifier,
                    AlertLevel::Info,
                    &[message.clone(), "Resolving PagerDuty incident.".to_owned()],
                )
                .await;

                let event = IncidentEvent::new(
                    message,
                    json!({
                        "previous_height": previous.sample,
                        "current_height": height,
                    }),
                );
                IncidentLedger::new(ctx.notifier)
                    .resolve(&event, previous.incident_key.as_ref())
                    .await;
            }
            _ => {}
        }

        Evaluation::passed(ExplorerResult::new(ctx.now, height, Outcome::Success))
    }
}

pub struct ExplorerStep {
    source: Box<dyn ExplorerSource>,
    detector: ExplorerStallDetector,
}

impl ExplorerStep {
    pub fn new(source: Box<dyn ExplorerSource>, detector: ExplorerStallDetector) -> Self {
        Self { source, detector }
    }
}

#[async_trait::async_trait]
impl Step for ExplorerStep {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: &RunContext<'_>, previous: Option<&Value>) -> StepOutcome {
        let previous = decode_previous::<ExplorerResult>(NAME, previous);
        let height = self.source.sample().await;
        self.detector
            .evaluate(ctx, previous, height)
            .await
            .into_outcome(NAME)
    }
}
