//! Leader/follower height progress check.
//!
//! Each run compares the freshly sampled heights against the last persisted
//! [`HeightsResult`]. Rules are tried in severity order:
//!
//! ```text
//!   unreachable -> no history -> too soon -> leader stalled
//!     -> follower stalled -> follower reversed -> healthy
//! ```
//!
//! Unreachable and too-soon runs hand back the previous record untouched, so
//! the elapsed time keeps counting from the last real comparison.

use crate::{
    alerter::{AlertLevel, IncidentEvent, Notifier, report},
    collector::{HeightSource, SourceError},
    engine::{Evaluation, RunContext, Step, StepOutcome, decode_previous},
    incident::IncidentLedger,
    models::{HeightsResult, HeightsSample, Outcome},
    timefmt::format_ts,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::warn;

pub const NAME: &str = "heights";

/// How a fresh sample compares to the last persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightVerdict {
    TooSoon,
    LeaderStalled,
    FollowerStalled,
    FollowerReversed,
    Healthy,
}

/// Pure classification of a sample against history. Unreachable nodes and
/// first runs never get this far.
pub fn classify(
    previous: &HeightsResult,
    sample: &HeightsSample,
    now: u64,
    min_interval: Duration,
) -> HeightVerdict {
    let elapsed = Duration::from_secs(now.saturating_sub(previous.timestamp));
    if elapsed < min_interval {
        return HeightVerdict::TooSoon;
    }

    let last = &previous.sample;
    if sample.leader == last.leader {
        HeightVerdict::LeaderStalled
    } else if sample.follower == last.follower {
        HeightVerdict::FollowerStalled
    } else if sample.follower < last.follower {
        HeightVerdict::FollowerReversed
    } else {
        HeightVerdict::Healthy
    }
}

#[derive(Debug, Clone)]
pub struct HeightStallDetector {
    min_interval: Duration,
}

impl HeightStallDetector {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub async fn evaluate(
        &self,
        ctx: &RunContext<'_>,
        previous: Option<HeightsResult>,
        sample: Result<HeightsSample, SourceError>,
    ) -> Evaluation<HeightsResult> {
        let notifier = ctx.notifier;
        let sample = match sample {
            Ok(sample) => sample,
            Err(error) => {
                warn!(error = %error, "failed to sample heights");
                return unreachable_follower(notifier, previous).await;
            }
        };
        let Some(previous) = previous else {
            notifier.log(&["First run, height checks skipped.".to_owned()]);
            return Evaluation::passed(HeightsResult::new(ctx.now, sample, Outcome::Success));
        };

        match classify(&previous, &sample, ctx.now, self.min_interval) {
            HeightVerdict::TooSoon => skip(notifier, previous, ctx.now),
            HeightVerdict::LeaderStalled => leader_stalled(ctx, &previous, sample).await,
            verdict => {
                if previous.result == Outcome::LeaderStalled {
                    leader_recovered(notifier, &previous, &sample).await;
                }
                match verdict {
                    HeightVerdict::FollowerStalled => follower_stalled(ctx, &previous, sample).await,
                    HeightVerdict::FollowerReversed => follower_reversed(ctx, &previous, sample).await,
                    _ => healthy(ctx, &previous, sample).await,
                }
            }
        }
    }
}

async fn unreachable_follower(
    notifier: &dyn Notifier,
    previous: Option<HeightsResult>,
) -> Evaluation<HeightsResult> {
    report(
        notifier,
        AlertLevel::Error,
        &["Error connecting to the follower. See job output for details.".to_owned()],
    )
    .await;
    Evaluation::failed(previous)
}

fn skip(notifier: &dyn Notifier, previous: HeightsResult, now: u64) -> Evaluation<HeightsResult> {
    notifier.log(&[
        "Not enough time passed, heights checks skipped.".to_owned(),
        format!("Previous run: {}", format_ts(previous.timestamp)),
        format!("Current run: {}", format_ts(now)),
    ]);
    Evaluation::passed(previous)
}

async fn leader_stalled(
    ctx: &RunContext<'_>,
    previous: &HeightsResult,
    sample: HeightsSample,
) -> Evaluation<HeightsResult> {
    if previous.result != Outcome::LeaderStalled {
        report(
            ctx.notifier,
            AlertLevel::Error,
            &[
                format!("Network stalled at {}", sample.leader),
                format!("First seen: {} (UTC)", format_ts(previous.timestamp)),
                format!("Current follower height at {}", sample.follower),
                "Creating alert in PagerDuty.".to_owned(),
            ],
        )
        .await;
    } else {
        ctx.notifier
            .log(&[format!("Leader still at {}", sample.leader)]);
    }

    let carried = IncidentLedger::carried_key(
        Outcome::LeaderStalled,
        previous.result,
        previous.incident_key.as_ref(),
    );
    let event = IncidentEvent::new(
        format!("Leader stalled at {}", sample.leader),
        json!({
            "leader_height": sample.leader,
            "follower_height": sample.follower,
        }),
    );
    let incident_key = IncidentLedger::new(ctx.notifier).trigger(&event, carried).await;

    // The follower never lowers the stored floor while the leader is stuck.
    let persisted = HeightsSample::new(
        sample.leader,
        sample.follower.max(previous.sample.follower),
    );
    Evaluation::failed(Some(
        HeightsResult::new(ctx.now, persisted, Outcome::LeaderStalled)
            .with_incident_key(incident_key),
    ))
}

async fn leader_recovered(notifier: &dyn Notifier, previous: &HeightsResult, sample: &HeightsSample) {
    let message = format!(
        "Leader advanced from {} to {}",
        previous.sample.leader, sample.leader
    );
    report(
        notifier,
        AlertLevel::Info,
        &[message.clone(), "Resolving PagerDuty incident.".to_owned()],
    )
    .await;

    let event = IncidentEvent::new(
        message,
        json!({
            "previous_leader_height": previous.sample.leader,
            "current_leader_height": sample.leader,
        }),
    );
    IncidentLedger::new(notifier)
        .resolve(&event, previous.incident_key.as_ref())
        .await;
}

async fn follower_stalled(
    ctx: &RunContext<'_>,
    previous: &HeightsResult,
    sample: HeightsSample,
) -> Evaluation<HeightsResult> {
    if !previous.result.is_follower_episode() {
        report(
            ctx.notifier,
            AlertLevel::Error,
            &[
                format!("Follower stalled at {}", sample.follower),
                format!("First seen at {}", format_ts(previous.timestamp)),
            ],
        )
        .await;
    } else {
        ctx.notifier
            .log(&[format!("Follower still at {}", sample.follower)]);
    }

    Evaluation::failed(Some(HeightsResult::new(
        ctx.now,
        sample,
        Outcome::FollowerStalled,
    )))
}

async fn follower_reversed(
    ctx: &RunContext<'_>,
    previous: &HeightsResult,
    sample: HeightsSample,
) -> Evaluation<HeightsResult> {
    // Keep the historical maximum so a partial catch-up still reads as reversed.
    let floor = previous.sample.follower;

    if !previous.result.is_follower_episode() {
        report(
            ctx.notifier,
            AlertLevel::Error,
            &[
                format!("Follower went backwards from {} to {}", floor, sample.follower),
                format!("Last good height seen at {}", format_ts(previous.timestamp)),
            ],
        )
        .await;
    } else {
        ctx.notifier.log(&[format!(
            "Follower still below {} at {}",
            floor, sample.follower
        )]);
    }

    let persisted = HeightsSample::new(sample.leader, floor);
    Evaluation::failed(Some(HeightsResult::new(
        ctx.now,
        persisted,
        Outcome::FollowerReversed,
    )))
}

async fn healthy(
    ctx: &RunContext<'_>,
    previous: &HeightsResult,
    sample: HeightsSample,
) -> Evaluation<HeightsResult> {
    if previous.result.is_follower_episode() {
        report(
            ctx.notifier,
            AlertLevel::Info,
            &[
                format!(
                    "Follower advanced from {} to {}",
                    previous.sample.follower, sample.follower
                ),
                "Previous problem resolved.".to_owned(),
            ],
        )
        .await;
    }

    Evaluation::passed(HeightsResult::new(ctx.now, sample, Outcome::Success))
}

/// Engine step wrapping a [`HeightSource`] and the detector.
pub struct HeightsStep {
    source: Box<dyn HeightSource>,
    detector: HeightStallDetector,
}

impl HeightsStep {
    pub fn new(source: Box<dyn HeightSource>, detector: HeightStallDetector) -> Self {
        Self { source, detector }
    }
}

#[async_trait::async_trait]
impl Step for HeightsStep {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self, ctx: &RunContext<'_>, previous: Option<&Value>) -> StepOutcome {
        let previous = decode_previous::<HeightsResult>(NAME, previous);
        let sample = self.source.sample().await;
        self.detector
            .evaluate(ctx, previous, sample)
            .await
            .into_outcome(NAME)
    }
}
