//! Advisory Dispatcher
//!
//! Turns triggers into spoken advisories:
//!
//! 1. A trigger whose class already has an advisory pending or awaiting
//!    speech is `Suppressed`.
//! 2. Otherwise retrieval, assembly and generation run in a spawned task,
//!    with a hard timeout per generation call and one retry (backoff plus
//!    jitter) on transient failure.
//! 3. Generated advisories join one global FIFO speech queue; the sink is
//!    never called concurrently.
//! 4. Pending advisories are withdrawn on shutdown or when their condition
//!    has been clear for the grace period. The check happens before each
//!    generation call and before the speech call, never mid-utterance.
//!
//! The in-flight set, speech queue and condition tracking are owned by a
//! single actor task ([`Dispatcher`]); everything else talks to it through
//! a cloneable [`DispatcherHandle`].

mod actor;
mod generation;

pub use actor::{Dispatcher, DispatcherHandle};
pub use generation::MAX_ATTEMPTS;

use std::time::Duration;

use chrono::TimeDelta;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::{defaults, AdvisorConfig, EmptyContextPolicy};
use crate::types::{Advisory, AdvisoryId, AdvisoryStatus, TriggerClassId};

/// Runtime knobs for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub k: usize,
    pub on_empty_context: EmptyContextPolicy,
    pub generation_timeout: Duration,
    pub retry_backoff: Duration,
    pub retry_jitter: Duration,
    /// Clear time (telemetry clock) after which a pending advisory is withdrawn
    pub cancel_grace: TimeDelta,
    pub command_buffer: usize,
    pub broadcast_capacity: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &AdvisorConfig) -> Self {
        let d = &config.dispatch;
        Self {
            k: config.retrieval.k,
            on_empty_context: config.retrieval.on_empty_context,
            generation_timeout: d.generation_timeout(),
            retry_backoff: d.retry_backoff(),
            retry_jitter: Duration::from_millis(d.retry_jitter_ms),
            cancel_grace: d.cancel_grace(),
            command_buffer: d.command_buffer.max(1),
            broadcast_capacity: defaults::ADVISORY_BROADCAST_CAPACITY,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&AdvisorConfig::default())
    }
}

/// Result of offering a trigger to the dispatcher
#[derive(Debug)]
pub enum DispatchOutcome {
    Accepted(AdvisoryTicket),
    /// Same class already has an advisory in flight
    Suppressed {
        class: TriggerClassId,
        in_flight: AdvisoryId,
    },
}

impl DispatchOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, DispatchOutcome::Suppressed { .. })
    }

    pub fn ticket(self) -> Option<AdvisoryTicket> {
        match self {
            DispatchOutcome::Accepted(ticket) => Some(ticket),
            DispatchOutcome::Suppressed { .. } => None,
        }
    }
}

/// Observer for one advisory's lifecycle
#[derive(Debug, Clone)]
pub struct AdvisoryTicket {
    id: AdvisoryId,
    rx: watch::Receiver<Advisory>,
}

impl AdvisoryTicket {
    pub(crate) fn new(id: AdvisoryId, rx: watch::Receiver<Advisory>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> AdvisoryId {
        self.id
    }

    /// Latest known state (non-blocking)
    pub fn current(&self) -> Advisory {
        self.rx.borrow().clone()
    }

    pub fn status(&self) -> AdvisoryStatus {
        self.rx.borrow().status
    }

    /// Wait until the advisory is Spoken, Failed or Cancelled.
    ///
    /// If the dispatcher goes away first, returns the last state seen.
    pub async fn wait(&mut self) -> Advisory {
        let done = self
            .rx
            .wait_for(|a| a.status.is_terminal())
            .await
            .map(|advisory| advisory.clone());
        match done {
            Ok(advisory) => advisory,
            Err(_) => self.rx.borrow().clone(),
        }
    }
}

/// Counters reported by [`DispatcherHandle::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub accepted: u64,
    pub suppressed: u64,
    pub spoken: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Spoken advisories whose sink reported an error
    pub speech_defects: u64,
    /// Generation retries performed
    pub retries: u64,
    pub in_flight: usize,
    pub queued: usize,
    pub speaking: bool,
}
