mod common;

use common::MockNotifier;
use heightwatch_monitor::{
    collector::SourceError,
    engine::{Evaluation, RunContext},
    heights::HeightStallDetector,
    models::{HeightsResult, HeightsSample, IncidentKey, Outcome},
};
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(600);
const T0: u64 = 1_700_000_000;

fn detector() -> HeightStallDetector {
    HeightStallDetector::new(INTERVAL)
}

fn heights(leader: u64, follower: u64) -> Result<HeightsSample, SourceError> {
    Ok(HeightsSample::new(leader, follower))
}

fn unreachable() -> Result<HeightsSample, SourceError> {
    Err(SourceError::PeerUnreachable(
        "Post http://localhost:8088/v2: dial tcp".to_owned(),
    ))
}

async fn run(
    notifier: &MockNotifier,
    now: u64,
    previous: Option<HeightsResult>,
    sample: Result<HeightsSample, SourceError>,
) -> Evaluation<HeightsResult> {
    let ctx = RunContext { now, notifier };
    detector().evaluate(&ctx, previous, sample).await
}

/// Feeds samples one interval apart, threading each result into the next run.
async fn run_sequence(
    notifier: &MockNotifier,
    start: HeightsResult,
    samples: &[(u64, u64)],
) -> Vec<Evaluation<HeightsResult>> {
    let mut previous = Some(start);
    let mut now = T0;
    let mut evaluations = Vec::new();
    for &(leader, follower) in samples {
        now += INTERVAL.as_secs();
        let evaluation = run(notifier, now, previous.clone(), heights(leader, follower)).await;
        previous = evaluation.next.clone();
        evaluations.push(evaluation);
    }
    evaluations
}

fn baseline(leader: u64, follower: u64) -> HeightsResult {
    HeightsResult::new(T0, HeightsSample::new(leader, follower), Outcome::Success)
}

#[tokio::test]
async fn first_run_records_sample_without_alerting() {
    let notifier = MockNotifier::default();

    let evaluation = run(&notifier, T0, None, heights(5, 4)).await;

    assert!(evaluation.ok);
    assert_eq!(
        evaluation.next,
        Some(HeightsResult::new(T0, HeightsSample::new(5, 4), Outcome::Success))
    );
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn stalled_leader_opens_incident_with_new_key() {
    let notifier = MockNotifier::default();

    let evaluation = run(&notifier, T0 + 600, Some(baseline(10, 10)), heights(10, 10)).await;

    assert!(!evaluation.ok);
    assert!(evaluation.next.is_some());
    let Some(next) = evaluation.next else {
        return;
    };
    assert_eq!(next.result, Outcome::LeaderStalled);
    assert_eq!(next.sample, HeightsSample::new(10, 10));
    assert_eq!(next.timestamp, T0 + 600);
    assert_eq!(next.incident_key, Some(IncidentKey::new("key-1")));

    assert_eq!(notifier.triggers(), vec![(None, IncidentKey::new("key-1"))]);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn unreachable_follower_keeps_previous_record() {
    let notifier = MockNotifier::default();
    let previous = HeightsResult::new(T0, HeightsSample::new(10, 9), Outcome::LeaderStalled)
        .with_incident_key(Some(IncidentKey::new("open")));

    let evaluation = run(&notifier, T0 + 3_600, Some(previous.clone()), unreachable()).await;

    assert!(!evaluation.ok);
    assert_eq!(evaluation.next, Some(previous));
    assert_eq!(notifier.errors().len(), 1);
    assert!(notifier.triggers().is_empty());
    assert!(notifier.resolves().is_empty());
}

#[tokio::test]
async fn unreachable_on_first_run_persists_nothing() {
    let notifier = MockNotifier::default();

    let evaluation = run(&notifier, T0, None, unreachable()).await;

    assert!(!evaluation.ok);
    assert_eq!(evaluation.next, None);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn too_soon_returns_previous_verbatim() {
    let notifier = MockNotifier::default();
    let previous = HeightsResult::new(T0, HeightsSample::new(10, 10), Outcome::FollowerStalled);

    let evaluation = run(&notifier, T0 + 599, Some(previous.clone()), heights(10, 10)).await;

    assert!(evaluation.ok);
    assert_eq!(evaluation.next, Some(previous));
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn leader_stall_episode_mints_once_and_resolves_once() {
    let notifier = MockNotifier::default();

    let evaluations =
        run_sequence(&notifier, baseline(10, 10), &[(10, 10), (10, 11), (10, 12), (11, 13)]).await;

    let outcomes: Vec<_> = evaluations
        .iter()
        .filter_map(|evaluation| evaluation.next.as_ref().map(|next| next.result))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::LeaderStalled,
            Outcome::LeaderStalled,
            Outcome::LeaderStalled,
            Outcome::Success
        ]
    );

    let key = IncidentKey::new("key-1");
    assert_eq!(notifier.minted(), 1);
    assert_eq!(
        notifier.triggers(),
        vec![
            (None, key.clone()),
            (Some(key.clone()), key.clone()),
            (Some(key.clone()), key.clone()),
        ]
    );
    assert_eq!(notifier.resolves(), vec![key]);

    // Only the first stall alerts in full; recovery is announced once.
    assert_eq!(notifier.errors().len(), 1);
    assert_eq!(notifier.infos().len(), 1);
    assert_eq!(
        evaluations.last().and_then(|evaluation| evaluation.next.as_ref()?.incident_key.clone()),
        None
    );
}

#[tokio::test]
async fn next_episode_gets_a_fresh_key() {
    let notifier = MockNotifier::default();

    let evaluations =
        run_sequence(&notifier, baseline(10, 10), &[(10, 10), (11, 11), (11, 12)]).await;

    let keys: Vec<_> = evaluations
        .iter()
        .filter_map(|evaluation| evaluation.next.as_ref()?.incident_key.clone())
        .collect();
    assert_eq!(keys, vec![IncidentKey::new("key-1"), IncidentKey::new("key-2")]);
    assert_eq!(notifier.resolves(), vec![IncidentKey::new("key-1")]);
}

#[tokio::test]
async fn leader_stall_outranks_follower_stall() {
    let notifier = MockNotifier::default();

    let evaluation = run(&notifier, T0 + 600, Some(baseline(20, 18)), heights(20, 18)).await;

    assert_eq!(
        evaluation.next.map(|next| next.result),
        Some(Outcome::LeaderStalled)
    );
}

#[tokio::test]
async fn reversal_floor_holds_until_follower_catches_up() {
    let notifier = MockNotifier::default();

    let evaluations =
        run_sequence(&notifier, baseline(200, 100), &[(201, 40), (202, 70), (203, 105)]).await;

    let persisted: Vec<_> = evaluations
        .iter()
        .filter_map(|evaluation| evaluation.next.as_ref().map(|next| (next.result, next.sample)))
        .collect();
    assert_eq!(
        persisted,
        vec![
            (Outcome::FollowerReversed, HeightsSample::new(201, 100)),
            (Outcome::FollowerReversed, HeightsSample::new(202, 100)),
            (Outcome::Success, HeightsSample::new(203, 105)),
        ]
    );

    assert_eq!(notifier.errors().len(), 1);
    assert_eq!(
        notifier.infos(),
        vec![vec![
            "Follower advanced from 100 to 105".to_owned(),
            "Previous problem resolved.".to_owned()
        ]]
    );
    assert!(notifier.triggers().is_empty());
}

#[tokio::test]
async fn leader_stall_during_reversal_keeps_the_floor() {
    let notifier = MockNotifier::default();

    let evaluations = run_sequence(
        &notifier,
        baseline(200, 100),
        &[(201, 40), (201, 50), (201, 60), (202, 70), (203, 105)],
    )
    .await;

    let persisted: Vec<_> = evaluations
        .iter()
        .filter_map(|evaluation| evaluation.next.as_ref().map(|next| (next.result, next.sample)))
        .collect();
    assert_eq!(
        persisted,
        vec![
            (Outcome::FollowerReversed, HeightsSample::new(201, 100)),
            (Outcome::LeaderStalled, HeightsSample::new(201, 100)),
            (Outcome::LeaderStalled, HeightsSample::new(201, 100)),
            (Outcome::FollowerReversed, HeightsSample::new(202, 100)),
            (Outcome::Success, HeightsSample::new(203, 105)),
        ]
    );
    assert_eq!(notifier.resolves(), vec![IncidentKey::new("key-1")]);
}

#[tokio::test]
async fn follower_stall_then_reversal_is_one_episode() {
    let notifier = MockNotifier::default();

    let evaluations =
        run_sequence(&notifier, baseline(10, 50), &[(11, 50), (12, 30), (13, 50), (14, 51)]).await;

    let outcomes: Vec<_> = evaluations
        .iter()
        .filter_map(|evaluation| evaluation.next.as_ref().map(|next| next.result))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::FollowerStalled,
            Outcome::FollowerReversed,
            Outcome::FollowerStalled,
            Outcome::Success
        ]
    );
    assert!(evaluations.iter().take(3).all(|evaluation| !evaluation.ok));
    assert_eq!(notifier.errors().len(), 1);
    assert_eq!(notifier.infos().len(), 1);
    assert!(notifier.triggers().is_empty());
}

#[tokio::test]
async fn leader_recovery_resolves_even_if_follower_lags() {
    let notifier = MockNotifier::default();
    let previous = HeightsResult::new(T0, HeightsSample::new(10, 10), Outcome::LeaderStalled)
        .with_incident_key(Some(IncidentKey::new("open")));

    let evaluation = run(&notifier, T0 + 600, Some(previous), heights(11, 10)).await;

    assert!(!evaluation.ok);
    assert!(evaluation.next.is_some());
    let Some(next) = evaluation.next else {
        return;
    };
    assert_eq!(next.result, Outcome::FollowerStalled);
    assert_eq!(next.incident_key, None);
    assert_eq!(notifier.resolves(), vec![IncidentKey::new("open")]);
    // Recovery notice plus the new follower alert.
    assert_eq!(notifier.infos().len(), 1);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn healthy_after_follower_stall_sends_recovery_without_resolve() {
    let notifier = MockNotifier::default();
    let previous = HeightsResult::new(T0, HeightsSample::new(10, 9), Outcome::FollowerStalled);

    let evaluation = run(&notifier, T0 + 600, Some(previous), heights(12, 11)).await;

    assert!(evaluation.ok);
    assert_eq!(
        notifier.infos(),
        vec![vec![
            "Follower advanced from 9 to 11".to_owned(),
            "Previous problem resolved.".to_owned()
        ]]
    );
    assert!(notifier.resolves().is_empty());
}

#[tokio::test]
async fn failed_trigger_retries_minting_on_next_stall() {
    let notifier = MockNotifier::default();
    notifier.set_fail_triggers(true);

    let first = run(&notifier, T0 + 600, Some(baseline(10, 10)), heights(10, 10)).await;
    assert!(first.next.is_some());
    let Some(stalled) = first.next else {
        return;
    };
    assert_eq!(stalled.result, Outcome::LeaderStalled);
    assert_eq!(stalled.incident_key, None);

    notifier.set_fail_triggers(false);
    let second = run(&notifier, T0 + 1_200, Some(stalled), heights(10, 11)).await;

    assert_eq!(
        second.next.and_then(|next| next.incident_key),
        Some(IncidentKey::new("key-1"))
    );
    assert_eq!(notifier.triggers(), vec![(None, IncidentKey::new("key-1"))]);
    // The full alert went out on the first stall only.
    assert_eq!(notifier.errors().len(), 1);
}
