//! Pipeline error taxonomy
//!
//! Every failure inside the advisory pipeline maps onto one of these variants.
//! None of them is fatal to the process: a failing trigger is marked failed,
//! logged, and the pipeline keeps consuming telemetry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the retrieval-and-advisory pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AdvisorError {
    /// Malformed flight state, query vector or request parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Retrieval asked for fewer than one result.
    #[error("Invalid k: {0} (must be >= 1)")]
    InvalidK(usize),

    /// The procedure index has no procedures loaded.
    #[error("Procedure index is empty")]
    IndexEmpty,

    /// The injected embedding function failed.
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// Context assembly was given an empty retrieval result.
    #[error("Empty context: no procedures retrieved")]
    EmptyContext,

    /// The generation backend exceeded its hard timeout.
    #[error("Generation timed out after {timeout_ms} ms")]
    GenerationTimeout { timeout_ms: u64 },

    /// The generation backend returned an error.
    #[error("Generation error: {message}")]
    GenerationError { message: String, retryable: bool },

    /// The speech sink failed to render an utterance.
    #[error("Speech sink error: {0}")]
    SpeechSinkError(String),

    /// The dispatcher actor is no longer running.
    #[error("Dispatcher unavailable: {0}")]
    DispatcherClosed(String),
}

impl AdvisorError {
    /// Whether a generation attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AdvisorError::GenerationTimeout { .. } => true,
            AdvisorError::GenerationError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Short machine-readable tag used in logs and history records.
    pub fn kind(&self) -> &'static str {
        match self {
            AdvisorError::InvalidInput(_) => "invalid_input",
            AdvisorError::InvalidK(_) => "invalid_k",
            AdvisorError::IndexEmpty => "index_empty",
            AdvisorError::EmbeddingFailure(_) => "embedding_failure",
            AdvisorError::EmptyContext => "empty_context",
            AdvisorError::GenerationTimeout { .. } => "generation_timeout",
            AdvisorError::GenerationError { .. } => "generation_error",
            AdvisorError::SpeechSinkError(_) => "speech_sink_error",
            AdvisorError::DispatcherClosed(_) => "dispatcher_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_retryable_errors_are_transient() {
        assert!(AdvisorError::GenerationTimeout { timeout_ms: 500 }.is_transient());
        assert!(AdvisorError::GenerationError {
            message: "503".to_string(),
            retryable: true
        }
        .is_transient());
        assert!(!AdvisorError::GenerationError {
            message: "400".to_string(),
            retryable: false
        }
        .is_transient());
        assert!(!AdvisorError::IndexEmpty.is_transient());
    }

    #[test]
    fn display_includes_detail() {
        let err = AdvisorError::InvalidK(0);
        assert_eq!(err.to_string(), "Invalid k: 0 (must be >= 1)");
        assert_eq!(err.kind(), "invalid_k");
    }
}
