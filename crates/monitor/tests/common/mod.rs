#![allow(dead_code)]

use heightwatch_monitor::{
    alerter::{AlertError, IncidentEvent, Notifier},
    collector::{ExplorerSource, HeightSource, SourceError},
    models::{HeightsSample, IncidentKey},
};
use std::{collections::VecDeque, sync::Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Info(Vec<String>),
    Error(Vec<String>),
    Trigger {
        supplied: Option<IncidentKey>,
        returned: IncidentKey,
    },
    Resolve(IncidentKey),
}

#[derive(Default)]
pub struct MockNotifier {
    calls: Mutex<Vec<Call>>,
    minted: Mutex<usize>,
    fail_triggers: Mutex<bool>,
}

impl MockNotifier {
    pub fn calls(&self) -> Vec<Call> {
        match self.calls.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.calls.lock() {
            guard.clear();
        }
    }

    pub fn minted(&self) -> usize {
        self.minted.lock().map(|guard| *guard).unwrap_or(0)
    }

    pub fn set_fail_triggers(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_triggers.lock() {
            *guard = fail;
        }
    }

    pub fn errors(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Error(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Info(lines) => Some(lines),
                _ => None,
            })
            .collect()
    }

    pub fn triggers(&self) -> Vec<(Option<IncidentKey>, IncidentKey)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Trigger { supplied, returned } => Some((supplied, returned)),
                _ => None,
            })
            .collect()
    }

    pub fn resolves(&self) -> Vec<IncidentKey> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Resolve(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        if let Ok(mut guard) = self.calls.lock() {
            guard.push(call);
        }
    }

    fn mint(&self) -> IncidentKey {
        let mut guard = match self.minted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += 1;
        IncidentKey::new(format!("key-{}", *guard))
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn info(&self, lines: &[String]) -> Result<(), AlertError> {
        self.record(Call::Info(lines.to_vec()));
        Ok(())
    }

    async fn error(&self, lines: &[String]) -> Result<(), AlertError> {
        self.record(Call::Error(lines.to_vec()));
        Ok(())
    }

    async fn trigger_incident(
        &self,
        _event: &IncidentEvent,
        incident_key: Option<&IncidentKey>,
    ) -> Result<IncidentKey, AlertError> {
        let failing = self.fail_triggers.lock().map(|guard| *guard).unwrap_or(false);
        if failing {
            // Any transport error will do; the detector only logs it.
            return Err(AlertError::Telegram(teloxide_network_error()));
        }

        let returned = match incident_key {
            Some(key) => key.clone(),
            None => self.mint(),
        };
        self.record(Call::Trigger {
            supplied: incident_key.cloned(),
            returned: returned.clone(),
        });
        Ok(returned)
    }

    async fn resolve_incident(
        &self,
        _event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError> {
        self.record(Call::Resolve(incident_key.clone()));
        Ok(())
    }
}

fn teloxide_network_error() -> teloxide::RequestError {
    teloxide::RequestError::Io(std::io::Error::other("pager unreachable").into())
}

/// Height source replaying a fixed script; `None` entries are connection failures.
pub struct ScriptedHeights {
    samples: Mutex<VecDeque<Option<HeightsSample>>>,
}

impl ScriptedHeights {
    pub fn new(samples: impl IntoIterator<Item = Option<HeightsSample>>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl HeightSource for ScriptedHeights {
    async fn sample(&self) -> Result<HeightsSample, SourceError> {
        let next = self
            .samples
            .lock()
            .ok()
            .and_then(|mut guard| guard.pop_front())
            .flatten();
        next.ok_or_else(|| SourceError::PeerUnreachable("connection refused".to_owned()))
    }
}

pub struct ScriptedExplorer {
    heights: Mutex<VecDeque<Option<u64>>>,
}

impl ScriptedExplorer {
    pub fn new(heights: impl IntoIterator<Item = Option<u64>>) -> Self {
        Self {
            heights: Mutex::new(heights.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl ExplorerSource for ScriptedExplorer {
    async fn sample(&self) -> Result<u64, SourceError> {
        let next = self
            .heights
            .lock()
            .ok()
            .and_then(|mut guard| guard.pop_front())
            .flatten();
        next.ok_or_else(|| SourceError::Malformed("no explorer height".to_owned()))
    }
}
