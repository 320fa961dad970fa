//! Retrieval Engine
//!
//! Converts a flight state (or trigger) into query text, embeds it with the
//! injected [`Embedder`], and asks the live procedure index for the top-K
//! nearest procedures. Pure read: no state is mutated.

pub mod embedder;
pub mod query;

pub use embedder::{Embedder, HashingEmbedder};

use std::sync::Arc;

use tracing::debug;

use crate::error::AdvisorError;
use crate::index::IndexHandle;
use crate::types::{FlightState, RetrievalResult, Trigger};

#[derive(Clone)]
pub struct RetrievalEngine {
    index: IndexHandle,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalEngine {
    pub fn new(index: IndexHandle, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Top-`k` procedures for a flight state.
    pub async fn retrieve(&self, state: &FlightState, k: usize) -> Result<RetrievalResult, AdvisorError> {
        if k == 0 {
            return Err(AdvisorError::InvalidK(k));
        }
        state.validate()?;
        self.retrieve_text(&query::state_query(state), k).await
    }

    /// Top-`k` procedures for a trigger; the class description is part of the query.
    pub async fn retrieve_for_trigger(
        &self,
        trigger: &Trigger,
        k: usize,
    ) -> Result<RetrievalResult, AdvisorError> {
        if k == 0 {
            return Err(AdvisorError::InvalidK(k));
        }
        trigger.state.validate()?;
        self.retrieve_text(&query::trigger_query(trigger), k).await
    }

    async fn retrieve_text(&self, text: &str, k: usize) -> Result<RetrievalResult, AdvisorError> {
        // One snapshot per query: a concurrent swap cannot mix two index versions.
        let index = self.index.snapshot();
        if index.is_empty() {
            return Err(AdvisorError::IndexEmpty);
        }

        let vector = self.embedder.embed(text).await.map_err(|e| match e {
            AdvisorError::EmbeddingFailure(_) => e,
            other => AdvisorError::EmbeddingFailure(other.to_string()),
        })?;
        if vector.len() != self.embedder.dimension() {
            return Err(AdvisorError::EmbeddingFailure(format!(
                "{} embedder returned {} components, expected {}",
                self.embedder.embedder_name(),
                vector.len(),
                self.embedder.dimension()
            )));
        }

        let hits = index.lookup(&vector, k)?;
        debug!(
            index_version = %index.version(),
            k,
            hits = hits.len(),
            top_score = hits.first().map_or(0.0, |h| h.score),
            "[Retrieval] Query complete"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ProcedureIndex, SimilarityMetric};
    use crate::types::{GearPosition, Procedure, ProcedureId, ProcedureSource};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AdvisorError> {
            Err(AdvisorError::EmbeddingFailure("model offline".to_string()))
        }
        fn dimension(&self) -> usize {
            8
        }
        fn embedder_name(&self) -> &'static str {
            "failing"
        }
    }

    fn state() -> FlightState {
        FlightState {
            timestamp: Utc::now(),
            gear: GearPosition::Up,
            flap_index: 1,
            spoiler_position: 0.0,
            autopilot_modes: Default::default(),
            airspeed_kt: 160.0,
            angle_of_attack_deg: 4.0,
            altitude_agl_ft: 400.0,
        }
    }

    fn engine_with(texts: &[(&str, &str)]) -> RetrievalEngine {
        let embedder = HashingEmbedder::new(128);
        let procedures = texts
            .iter()
            .map(|(id, text)| Procedure {
                id: ProcedureId::new(*id),
                title: (*text).to_string(),
                steps: vec![(*text).to_string()],
                embedding: embedder.embed_sync(text).unwrap(),
                source: ProcedureSource::default(),
            })
            .collect();
        let index = ProcedureIndex::build("test", 128, SimilarityMetric::Cosine, procedures).unwrap();
        RetrievalEngine::new(IndexHandle::new(index), Arc::new(embedder))
    }

    #[tokio::test]
    async fn retrieve_returns_at_most_k_sorted() {
        let engine = engine_with(&[
            ("GEAR-01", "gear up low altitude extend landing gear"),
            ("OVSP-01", "overspeed reduce thrust airspeed"),
            ("STALL-01", "stall recovery angle of attack"),
            ("FIRE-01", "engine fire checklist"),
            ("PRESS-01", "cabin pressure loss descent"),
        ]);
        let hits = engine.retrieve(&state(), 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn zero_k_is_rejected_before_any_work() {
        let engine = engine_with(&[("A", "anything")]);
        assert_eq!(engine.retrieve(&state(), 0).await.unwrap_err(), AdvisorError::InvalidK(0));
    }

    #[tokio::test]
    async fn empty_index_fails() {
        let engine = RetrievalEngine::new(
            IndexHandle::new(ProcedureIndex::empty(8, SimilarityMetric::Cosine)),
            Arc::new(HashingEmbedder::new(8)),
        );
        assert_eq!(engine.retrieve(&state(), 3).await.unwrap_err(), AdvisorError::IndexEmpty);
    }

    #[tokio::test]
    async fn embedder_errors_propagate() {
        let embedder = HashingEmbedder::new(8);
        let procedure = Procedure {
            id: ProcedureId::new("A"),
            title: "a".to_string(),
            steps: vec![],
            embedding: embedder.embed_sync("a b c").unwrap(),
            source: ProcedureSource::default(),
        };
        let index = ProcedureIndex::build("t", 8, SimilarityMetric::Cosine, vec![procedure]).unwrap();
        let engine = RetrievalEngine::new(IndexHandle::new(index), Arc::new(FailingEmbedder));
        assert!(matches!(
            engine.retrieve(&state(), 1).await,
            Err(AdvisorError::EmbeddingFailure(_))
        ));
    }
}
