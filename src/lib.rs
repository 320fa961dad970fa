//! Flight Advisor: real-time crew advisory pipeline
//!
//! Streams flight-state telemetry, detects conditions that warrant
//! guidance, retrieves the relevant safety procedures from an indexed
//! corpus, and delivers a short generated advisory through a speech sink.
//!
//! ## Architecture
//!
//! - **Detector**: per-class state machines over a tagged condition registry
//! - **Index / Retrieval**: immutable top-K similarity index behind a
//!   lock-free swappable handle, queried through an injected embedder
//! - **Context**: deterministic prompt assembly from retrieved procedures
//! - **Dispatch**: single actor owning the in-flight set and the FIFO speech
//!   queue; generation runs in spawned tasks with timeouts and one retry
//! - **LLM / Speech**: generation backends and speech sinks behind traits

pub mod app;
pub mod config;
pub mod context;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod speech;
pub mod storage;
pub mod types;

pub use config::AdvisorConfig;
pub use error::AdvisorError;

pub use types::{
    Advisory, AdvisoryId, AdvisoryStatus, CancelReason, FlightState, GearPosition, Procedure,
    ProcedureId, RetrievalResult, ScoredProcedure, Trigger, TriggerClassId,
};

pub use context::{assemble, Prompt};
pub use detector::{Condition, StateChangeDetector, TriggerClass};
pub use dispatch::{AdvisoryTicket, DispatchOutcome, Dispatcher, DispatcherHandle};
pub use index::{IndexHandle, ProcedureIndex, SimilarityMetric};
pub use llm::GenerationBackend;
pub use retrieval::{Embedder, RetrievalEngine};
pub use speech::SpeechSink;
pub use storage::AdvisoryHistory;
