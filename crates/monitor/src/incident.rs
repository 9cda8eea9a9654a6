//! Incident key bookkeeping shared by the stall detectors.
//!
//! A key is minted at most once per stall episode, re-sent with every trigger
//! while the episode lasts, and handed to exactly one resolve call when it
//! ends. The only place a key lives between runs is the persisted
//! [`CheckResult`](crate::models::CheckResult).

use crate::{
    alerter::{IncidentEvent, Notifier},
    models::{IncidentKey, Outcome},
};
use tracing::{info, warn};

pub struct IncidentLedger<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> IncidentLedger<'a> {
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        Self { notifier }
    }

    /// The key to re-trigger with, if the previous run belonged to the same episode.
    pub fn carried_key<'k>(
        stalled: Outcome,
        previous: Outcome,
        previous_key: Option<&'k IncidentKey>,
    ) -> Option<&'k IncidentKey> {
        if previous == stalled { previous_key } else { None }
    }

    /// Triggers (or refreshes) the incident and returns the key to persist.
    ///
    /// When the trigger fails the carried key is kept; without one, nothing is
    /// persisted and the next stalled run mints again.
    pub async fn trigger(
        &self,
        event: &IncidentEvent,
        carried: Option<&IncidentKey>,
    ) -> Option<IncidentKey> {
        match self.notifier.trigger_incident(event, carried).await {
            Ok(incident_key) => {
                info!(%incident_key, refreshed = carried.is_some(), "incident triggered");
                Some(incident_key)
            }
            Err(error) => {
                warn!(error = %error, "failed to trigger incident");
                carried.cloned()
            }
        }
    }

    /// Resolves the episode's incident. The key is spent either way.
    pub async fn resolve(&self, event: &IncidentEvent, incident_key: Option<&IncidentKey>) {
        let Some(incident_key) = incident_key else {
            warn!("stall episode ended without a recorded incident key, nothing to resolve");
            return;
        };

        match self.notifier.resolve_incident(event, incident_key).await {
            Ok(()) => info!(%incident_key, "incident resolved"),
            Err(error) => warn!(%incident_key, error = %error, "failed to resolve incident"),
        }
    }
}
