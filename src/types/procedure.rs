//! Indexed safety-procedure types: ProcedureId, Procedure, ScoredProcedure, RetrievalResult

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unique procedure identifier (e.g. "QRH-GEAR-01")
///
/// Ordering is lexicographic and is used to break similarity ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureId(pub String);

impl ProcedureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a procedure's text came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureSource {
    /// Source document (e.g. "QRH", "FCOM Vol 2")
    #[serde(default)]
    pub document: String,
    /// Section / chapter reference
    #[serde(default)]
    pub section: String,
    /// Document revision
    #[serde(default)]
    pub revision: String,
}

/// A unit of indexed safety-procedure text with its embedding
///
/// Immutable once indexed; the corpus is rebuilt offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: ProcedureId,
    pub title: String,
    /// Ordered procedure steps
    pub steps: Vec<String>,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub source: ProcedureSource,
}

impl Procedure {
    /// Procedure body as numbered steps, one per line
    pub fn body(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text submitted to the embedder when the corpus is indexed
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.steps.join("\n"))
    }
}

/// One retrieval hit
#[derive(Debug, Clone)]
pub struct ScoredProcedure {
    pub procedure: Arc<Procedure>,
    pub score: f64,
}

/// Ordered retrieval hits, highest score first, at most K entries
pub type RetrievalResult = Vec<ScoredProcedure>;
