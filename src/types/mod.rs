//! Shared data structures for the crew advisory pipeline
//!
//! - FlightState: telemetry snapshot (ingest boundary)
//! - Procedure / RetrievalResult: indexed corpus and retrieval hits
//! - Trigger: detector output
//! - Advisory: dispatcher output with lifecycle

mod state;
mod procedure;
mod trigger;
mod advisory;

pub use state::*;
pub use procedure::*;
pub use trigger::*;
pub use advisory::*;
