//! Persisted procedure-index dataset
//!
//! The index is stored as one immutable, versioned JSON document:
//!
//! ```json
//! { "format_version": 1, "version": "2026-10-01", "dimension": 256,
//!   "procedures": [ { "id": "...", "title": "...", "steps": [...],
//!                     "embedding": [...], "source": { ... } } ] }
//! ```
//!
//! A new corpus version is written to a temporary file and renamed into
//! place, so a watcher never sees a half-written dataset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{ProcedureIndex, SimilarityMetric};
use crate::error::AdvisorError;
use crate::retrieval::Embedder;
use crate::types::{Procedure, ProcedureId, ProcedureSource};

/// Dataset layout version understood by this build
pub const DATASET_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported dataset format v{found}, expected v{expected}")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("Dataset dimension {found} does not match configured dimension {expected}")]
    DimensionMismatch { found: usize, expected: usize },

    #[error("Invalid dataset: {0}")]
    Invalid(#[from] AdvisorError),
}

/// On-disk form of a built index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDataset {
    pub format_version: u32,
    /// Corpus version label (e.g. a build date or revision)
    pub version: String,
    pub dimension: usize,
    pub procedures: Vec<Procedure>,
}

impl IndexDataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DatasetError::Io(path.to_path_buf(), e))?;
        let dataset: Self = serde_json::from_str(&contents)?;
        if dataset.format_version != DATASET_FORMAT_VERSION {
            return Err(DatasetError::UnsupportedFormat {
                found: dataset.format_version,
                expected: DATASET_FORMAT_VERSION,
            });
        }
        info!(
            path = %path.display(),
            version = %dataset.version,
            procedures = dataset.procedures.len(),
            dimension = dataset.dimension,
            "[Index] Loaded procedure dataset"
        );
        Ok(dataset)
    }

    /// Write atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let json = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| DatasetError::Io(tmp.clone(), e))?;
        std::fs::rename(&tmp, path).map_err(|e| DatasetError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), version = %self.version, "[Index] Dataset written");
        Ok(())
    }

    /// Build a read-only index, checking the expected query dimension.
    pub fn into_index(
        self,
        metric: SimilarityMetric,
        expected_dimension: usize,
    ) -> Result<ProcedureIndex, DatasetError> {
        if self.dimension != expected_dimension {
            return Err(DatasetError::DimensionMismatch {
                found: self.dimension,
                expected: expected_dimension,
            });
        }
        Ok(ProcedureIndex::build(
            self.version,
            self.dimension,
            metric,
            self.procedures,
        )?)
    }
}

/// Load a dataset file straight into an index.
pub fn load_index(
    path: &Path,
    metric: SimilarityMetric,
    expected_dimension: usize,
) -> Result<ProcedureIndex, DatasetError> {
    IndexDataset::load(path)?.into_index(metric, expected_dimension)
}

/// A procedure before embedding (corpus authoring format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: ProcedureId,
    pub title: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub source: ProcedureSource,
}

/// Embed a corpus into a dataset with the given embedder.
pub async fn build_dataset(
    version: impl Into<String>,
    corpus: Vec<CorpusEntry>,
    embedder: &dyn Embedder,
) -> Result<IndexDataset, AdvisorError> {
    let mut procedures = Vec::with_capacity(corpus.len());
    for entry in corpus {
        let mut procedure = Procedure {
            id: entry.id,
            title: entry.title,
            steps: entry.steps,
            embedding: Vec::new(),
            source: entry.source,
        };
        procedure.embedding = embedder.embed(&procedure.embedding_text()).await?;
        procedures.push(procedure);
    }
    Ok(IndexDataset {
        format_version: DATASET_FORMAT_VERSION,
        version: version.into(),
        dimension: embedder.dimension(),
        procedures,
    })
}
