//! Trigger types: TriggerClassId, Trigger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FlightState;

/// Named category of flight-safety condition (e.g. "gear-up-low")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerClassId(pub String);

impl TriggerClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriggerClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classified condition emitted by the state change detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub class: TriggerClassId,
    /// Human description of the class, used in retrieval queries and prompts
    pub description: String,
    /// The snapshot that caused the trigger
    pub state: FlightState,
    /// Telemetry time at which the trigger fired
    pub fired_at: DateTime<Utc>,
    /// Per-class fire counter, starting at 1
    pub sequence: u64,
}
