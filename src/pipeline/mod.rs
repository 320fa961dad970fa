//! Processing Pipeline Module
//!
//! ```text
//! Telemetry ──> Detector ──(trigger)──> Dispatcher ──> Retrieval ──> Assembler
//!                  │                        │                          │
//!                  └──(condition activity)──┘      Speech <── Generation
//! ```
//!
//! Ingestion never waits on generation or speech: the loop only hands
//! triggers to the dispatcher actor, which runs the slow stages in tasks.

pub mod processing_loop;
pub mod source;

pub use processing_loop::ProcessingLoop;
pub use source::{JsonLinesSource, ReplaySource, TelemetryEvent, TelemetrySource};

use serde::Serialize;

/// Ingestion counters returned when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Valid states run through the detector
    pub states_processed: u64,
    /// Unparseable telemetry lines
    pub malformed: u64,
    /// Parsed states that failed validation (bad values, out of order)
    pub rejected: u64,
    pub triggers: u64,
    pub accepted: u64,
    pub suppressed: u64,
    pub dispatch_errors: u64,
}
