//! Procedure Index
//!
//! Immutable, versioned store of procedure text + embedding vectors with
//! linear-scan similarity lookup. A rebuilt index replaces the live one
//! atomically through [`IndexHandle`]; readers never lock.

pub mod dataset;
pub mod similarity;
pub mod watcher;

pub use dataset::{
    build_dataset, load_index, CorpusEntry, DatasetError, IndexDataset, DATASET_FORMAT_VERSION,
};
pub use similarity::SimilarityMetric;

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::AdvisorError;
use crate::types::{Procedure, ProcedureId, RetrievalResult, ScoredProcedure};

struct IndexEntry {
    procedure: Arc<Procedure>,
    norm: f64,
}

/// Read-only procedure index
pub struct ProcedureIndex {
    version: String,
    dimension: usize,
    metric: SimilarityMetric,
    /// Sorted by procedure id
    entries: Vec<IndexEntry>,
}

impl std::fmt::Debug for ProcedureIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureIndex")
            .field("version", &self.version)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("procedures", &self.entries.len())
            .finish()
    }
}

impl ProcedureIndex {
    /// An index with nothing loaded; every lookup fails with `IndexEmpty`.
    pub fn empty(dimension: usize, metric: SimilarityMetric) -> Self {
        Self {
            version: String::new(),
            dimension,
            metric,
            entries: Vec::new(),
        }
    }

    /// Build an index from fully embedded procedures.
    ///
    /// Rejects duplicate ids, vectors of the wrong dimension and non-finite
    /// components.
    pub fn build(
        version: impl Into<String>,
        dimension: usize,
        metric: SimilarityMetric,
        procedures: Vec<Procedure>,
    ) -> Result<Self, AdvisorError> {
        if dimension == 0 {
            return Err(AdvisorError::InvalidInput(
                "index dimension must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(procedures.len());
        let mut entries = Vec::with_capacity(procedures.len());
        for procedure in procedures {
            if !seen.insert(procedure.id.clone()) {
                return Err(AdvisorError::InvalidInput(format!(
                    "duplicate procedure id {}",
                    procedure.id
                )));
            }
            if procedure.embedding.len() != dimension {
                return Err(AdvisorError::InvalidInput(format!(
                    "procedure {} has dimension {}, index expects {}",
                    procedure.id,
                    procedure.embedding.len(),
                    dimension
                )));
            }
            if procedure.embedding.iter().any(|x| !x.is_finite()) {
                return Err(AdvisorError::InvalidInput(format!(
                    "procedure {} embedding contains non-finite values",
                    procedure.id
                )));
            }
            let norm = similarity::l2_norm(&procedure.embedding);
            entries.push(IndexEntry {
                procedure: Arc::new(procedure),
                norm,
            });
        }
        entries.sort_by(|a, b| a.procedure.id.cmp(&b.procedure.id));

        Ok(Self {
            version: version.into(),
            dimension,
            metric,
            entries,
        })
    }

    /// Top-`k` procedures by descending similarity, ties by ascending id.
    pub fn lookup(&self, query: &[f32], k: usize) -> Result<RetrievalResult, AdvisorError> {
        if k == 0 {
            return Err(AdvisorError::InvalidK(k));
        }
        if self.entries.is_empty() {
            return Err(AdvisorError::IndexEmpty);
        }
        if query.len() != self.dimension {
            return Err(AdvisorError::InvalidInput(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(AdvisorError::InvalidInput(
                "query vector contains non-finite values".to_string(),
            ));
        }

        let mut hits: Vec<ScoredProcedure> = match self.metric {
            SimilarityMetric::Cosine => {
                let query_norm = similarity::l2_norm(query);
                if query_norm <= f64::EPSILON {
                    return Err(AdvisorError::InvalidInput(
                        "query vector has zero norm".to_string(),
                    ));
                }
                self.entries
                    .iter()
                    .filter_map(|e| {
                        similarity::cosine_with_norms(query, query_norm, &e.procedure.embedding, e.norm)
                            .map(|score| ScoredProcedure {
                                procedure: Arc::clone(&e.procedure),
                                score,
                            })
                    })
                    .collect()
            }
            SimilarityMetric::L2 => self
                .entries
                .iter()
                .map(|e| ScoredProcedure {
                    procedure: Arc::clone(&e.procedure),
                    score: -similarity::l2_distance(query, &e.procedure.embedding),
                })
                .collect(),
        };

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.procedure.id.cmp(&b.procedure.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn get(&self, id: &ProcedureId) -> Option<&Procedure> {
        self.entries
            .binary_search_by(|e| e.procedure.id.cmp(id))
            .ok()
            .map(|i| self.entries[i].procedure.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }
}

/// Shared handle to the live index
///
/// Readers take a snapshot (`Arc` clone, no lock); `replace` swaps in a
/// rebuilt index in one atomic step. Lookups already running keep the
/// snapshot they started with.
#[derive(Clone)]
pub struct IndexHandle {
    current: Arc<ArcSwap<ProcedureIndex>>,
}

impl IndexHandle {
    pub fn new(index: ProcedureIndex) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(index)),
        }
    }

    pub fn snapshot(&self) -> Arc<ProcedureIndex> {
        self.current.load_full()
    }

    /// Install a rebuilt index and return the one it replaced.
    pub fn replace(&self, index: ProcedureIndex) -> Arc<ProcedureIndex> {
        let previous = self.current.swap(Arc::new(index));
        tracing::info!(
            old_version = %previous.version(),
            new_version = %self.current.load().version(),
            procedures = self.current.load().len(),
            "[Index] Procedure index swapped"
        );
        previous
    }
}
