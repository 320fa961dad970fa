//! Persistent storage (sled)

pub mod history;

pub use history::{run_history_recorder, AdvisoryHistory};

use thiserror::Error;

use crate::types::AdvisoryStatus;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Advisory is still {0}, only terminal advisories are stored")]
    NotTerminal(AdvisoryStatus),
}
