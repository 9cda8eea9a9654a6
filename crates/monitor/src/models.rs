use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use std::{collections::BTreeMap, fmt};

/// Leader and follower directory-block heights as reported by the follower node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightsSample {
    pub leader: u64,
    pub follower: u64,
}

impl HeightsSample {
    pub fn new(leader: u64, follower: u64) -> Self {
        Self { leader, follower }
    }
}

/// Outcome tag persisted alongside every check result. The serialized names
/// match the tags written by the earlier monitoring scripts so existing result
/// files keep loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "success", alias = "first")]
    Success,
    #[serde(rename = "skipped")]
    Skipped,
    #[serde(rename = "follower error")]
    FollowerError,
    #[serde(rename = "leader stalled", alias = "network stalled")]
    LeaderStalled,
    #[serde(rename = "follower stalled")]
    FollowerStalled,
    #[serde(rename = "follower reversed")]
    FollowerReversed,
    #[serde(rename = "explorer offline")]
    ExplorerOffline,
    #[serde(rename = "explorer stalled")]
    ExplorerStalled,
}

impl Outcome {
    /// Follower stalls and reversals form a single episode for alerting.
    pub fn is_follower_episode(self) -> bool {
        matches!(self, Outcome::FollowerStalled | Outcome::FollowerReversed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Outcome::Success => "success",
            Outcome::Skipped => "skipped",
            Outcome::FollowerError => "follower error",
            Outcome::LeaderStalled => "leader stalled",
            Outcome::FollowerStalled => "follower stalled",
            Outcome::FollowerReversed => "follower reversed",
            Outcome::ExplorerOffline => "explorer offline",
            Outcome::ExplorerStalled => "explorer stalled",
        };
        f.write_str(tag)
    }
}

/// Paging-system identifier of an open incident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentKey(String);

impl IncidentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted result of a single check step.
///
/// `S` is the sample the step compares across runs: [`HeightsSample`] for the
/// heights step, a bare `u64` for the explorer step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Sample"))]
pub struct CheckResult<S> {
    /// Unix seconds of the run that produced this record.
    #[serde(deserialize_with = "lenient_u64")]
    pub timestamp: u64,
    #[serde(alias = "heights", alias = "height", deserialize_with = "S::deserialize_sample")]
    pub sample: S,
    pub result: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_key: Option<IncidentKey>,
}

impl<S> CheckResult<S> {
    pub fn new(timestamp: u64, sample: S, result: Outcome) -> Self {
        Self {
            timestamp,
            sample,
            result,
            incident_key: None,
        }
    }

    pub fn with_incident_key(mut self, incident_key: Option<IncidentKey>) -> Self {
        self.incident_key = incident_key;
        self
    }
}

/// A value compared across runs. Decoding tolerates the looser encodings
/// found in result files written by the older scripts.
pub trait Sample: Sized {
    fn deserialize_sample<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>;
}

impl Sample for HeightsSample {
    fn deserialize_sample<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Loose {
            #[serde(deserialize_with = "lenient_u64")]
            leader: u64,
            #[serde(deserialize_with = "lenient_u64")]
            follower: u64,
        }

        let Loose { leader, follower } = Loose::deserialize(deserializer)?;
        Ok(HeightsSample { leader, follower })
    }
}

impl Sample for u64 {
    fn deserialize_sample<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient_u64(deserializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Integer(u64),
    Float(f64),
    Text(String),
}

/// Accepts `1500000000`, `1500000000.25` (truncated) and `"1234"`.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Integer(value) => Ok(value),
        LooseNumber::Float(value) => float_to_u64(value)
            .ok_or_else(|| D::Error::custom(format!("{value} is not a valid unsigned integer"))),
        LooseNumber::Text(text) => text.trim().parse().map_err(D::Error::custom),
    }
}

#[allow(clippy::as_conversions)]
fn float_to_u64(value: f64) -> Option<u64> {
    // `u64::MAX as f64` rounds up to 2^64, hence the strict bound.
    if value.is_finite() && value >= 0.0 && value < u64::MAX as f64 {
        Some(value.trunc() as u64)
    } else {
        None
    }
}

pub type HeightsResult = CheckResult<HeightsSample>;
pub type ExplorerResult = CheckResult<u64>;

/// Step name to raw persisted record. Each step decodes its own entry.
pub type ResultMap = BTreeMap<String, serde_json::Value>;
