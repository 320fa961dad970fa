//! Advisory types: AdvisoryId, AdvisoryStatus, Advisory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProcedureId, Trigger};
use crate::error::AdvisorError;

/// Unique advisory identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdvisoryId(pub Uuid);

impl AdvisoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdvisoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AdvisoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Advisory lifecycle
///
/// ```text
/// Pending ──> Generated ──> Spoken
///    │            │
///    ├──> Failed  └──> Cancelled
///    └──> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryStatus {
    /// Retrieval / generation in progress
    Pending,
    /// Text generated, waiting in the speech queue
    Generated,
    /// Delivered to the speech sink (possibly with a defect)
    Spoken,
    /// Retrieval or generation failed permanently
    Failed,
    /// Withdrawn before speech (shutdown or condition cleared)
    Cancelled,
}

impl AdvisoryStatus {
    /// Still occupying its trigger class's in-flight slot
    pub fn is_in_flight(&self) -> bool {
        matches!(self, AdvisoryStatus::Pending | AdvisoryStatus::Generated)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }
}

impl std::fmt::Display for AdvisoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisoryStatus::Pending => write!(f, "pending"),
            AdvisoryStatus::Generated => write!(f, "generated"),
            AdvisoryStatus::Spoken => write!(f, "spoken"),
            AdvisoryStatus::Failed => write!(f, "failed"),
            AdvisoryStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why an advisory was withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Shutdown,
    /// The triggering condition stayed clear for the grace period
    ConditionCleared,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Shutdown => write!(f, "shutdown"),
            CancelReason::ConditionCleared => write!(f, "condition cleared"),
        }
    }
}

/// Generated guidance tied to one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: AdvisoryId,
    pub trigger: Trigger,
    pub status: AdvisoryStatus,
    /// Generated advisory text (set once Generated)
    pub text: Option<String>,
    /// Procedures the prompt was grounded on, in retrieval order
    #[serde(default)]
    pub procedures: Vec<ProcedureId>,
    /// Generation attempts made (0, 1 or 2)
    pub attempts: u32,
    /// Why the advisory failed or was cancelled
    pub failure: Option<AdvisorError>,
    #[serde(default)]
    pub cancel_reason: Option<CancelReason>,
    /// Speech sink error; the advisory still counts as delivered
    pub speech_defect: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Advisory {
    pub fn pending(trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: AdvisoryId::new(),
            trigger,
            status: AdvisoryStatus::Pending,
            text: None,
            procedures: Vec::new(),
            attempts: 0,
            failure: None,
            cancel_reason: None,
            speech_defect: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn transition(&mut self, status: AdvisoryStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
