//! Retrieval contract: ordering, bounds, errors and index swaps.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use common::*;
use flight_advisor::app;
use flight_advisor::index::{load_index, IndexHandle, ProcedureIndex, SimilarityMetric};
use flight_advisor::retrieval::{Embedder, HashingEmbedder, RetrievalEngine};
use flight_advisor::types::{Procedure, ProcedureId, ProcedureSource};
use flight_advisor::AdvisorError;

/// Embedder that ignores the text and returns a fixed vector (or fails)
struct FixedEmbedder {
    vector: Option<Vec<f32>>,
    dimension: usize,
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AdvisorError> {
        self.vector
            .clone()
            .ok_or_else(|| AdvisorError::EmbeddingFailure("model offline".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embedder_name(&self) -> &'static str {
        "fixed"
    }
}

fn procedure(id: &str, embedding: Vec<f32>) -> Procedure {
    Procedure {
        id: ProcedureId::new(id),
        title: format!("Procedure {id}"),
        steps: vec!["Step one".to_string()],
        embedding,
        source: ProcedureSource::default(),
    }
}

/// Five procedures in 3-d space; B and D are exact ties
fn hand_built(version: &str) -> ProcedureIndex {
    ProcedureIndex::build(
        version,
        3,
        SimilarityMetric::Cosine,
        vec![
            procedure("E", vec![0.0, 0.0, 1.0]),
            procedure("D", vec![0.8, 0.6, 0.0]),
            procedure("A", vec![1.0, 0.0, 0.0]),
            procedure("C", vec![0.0, 1.0, 0.0]),
            procedure("B", vec![0.8, 0.6, 0.0]),
        ],
    )
    .unwrap()
}

fn engine(index: IndexHandle, vector: Option<Vec<f32>>) -> RetrievalEngine {
    RetrievalEngine::new(index, Arc::new(FixedEmbedder { vector, dimension: 3 }))
}

fn ids(results: &[flight_advisor::ScoredProcedure]) -> Vec<&str> {
    results.iter().map(|r| r.procedure.id.as_str()).collect()
}

#[tokio::test]
async fn top_three_of_five_ordered_with_ties_by_id() {
    let engine = engine(IndexHandle::new(hand_built("v1")), Some(vec![1.0, 0.2, 0.0]));

    let results = assert_ok!(engine.retrieve(&cruise(0), 3).await);

    assert_eq!(ids(&results), vec!["A", "B", "D"]);
    assert!(results[0].score > results[1].score);
    assert_eq!(results[1].score, results[2].score);
}

#[tokio::test]
async fn k_larger_than_index_returns_everything() {
    let engine = engine(IndexHandle::new(hand_built("v1")), Some(vec![0.0, 0.0, 1.0]));

    let results = engine.retrieve(&cruise(0), 10).await.unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(results[0].procedure.id.as_str(), "E");
}

#[tokio::test]
async fn zero_k_is_rejected() {
    let engine = engine(IndexHandle::new(hand_built("v1")), Some(vec![1.0, 0.0, 0.0]));

    let err = assert_err!(engine.retrieve(&cruise(0), 0).await);
    assert!(matches!(err, AdvisorError::InvalidK(0)));
}

#[tokio::test]
async fn empty_index_is_reported() {
    let index = IndexHandle::new(ProcedureIndex::empty(3, SimilarityMetric::Cosine));
    let engine = engine(index, Some(vec![1.0, 0.0, 0.0]));

    let err = engine.retrieve(&cruise(0), 3).await.unwrap_err();
    assert!(matches!(err, AdvisorError::IndexEmpty));
}

#[tokio::test]
async fn embedder_failure_is_surfaced() {
    let engine = engine(IndexHandle::new(hand_built("v1")), None);

    let err = engine.retrieve(&cruise(0), 3).await.unwrap_err();
    assert!(matches!(err, AdvisorError::EmbeddingFailure(_)));
}

#[tokio::test]
async fn wrong_dimension_query_is_an_embedding_failure() {
    let engine = engine(IndexHandle::new(hand_built("v1")), Some(vec![1.0, 0.0]));

    let err = engine.retrieve(&cruise(0), 3).await.unwrap_err();
    assert!(matches!(err, AdvisorError::EmbeddingFailure(_)));
}

#[tokio::test]
async fn invalid_state_is_rejected_before_lookup() {
    let engine = engine(IndexHandle::new(hand_built("v1")), Some(vec![1.0, 0.0, 0.0]));
    let mut state = cruise(0);
    state.altitude_agl_ft = f64::INFINITY;

    let err = engine.retrieve(&state, 3).await.unwrap_err();
    assert!(matches!(err, AdvisorError::InvalidInput(_)));
}

#[tokio::test]
async fn swapped_index_serves_new_version_while_old_snapshot_survives() {
    let handle = IndexHandle::new(hand_built("v1"));
    let engine = engine(handle.clone(), Some(vec![0.0, 1.0, 0.0]));

    let held = handle.snapshot();
    let replacement = ProcedureIndex::build(
        "v2",
        3,
        SimilarityMetric::Cosine,
        vec![procedure("Z", vec![0.0, 1.0, 0.0])],
    )
    .unwrap();
    let previous = handle.replace(replacement);

    assert_eq!(previous.version(), "v1");
    assert_eq!(held.version(), "v1");
    assert_eq!(held.len(), 5);

    let results = engine.retrieve(&cruise(0), 3).await.unwrap();
    assert_eq!(ids(&results), vec!["Z"]);
    assert_eq!(handle.snapshot().version(), "v2");
}

#[tokio::test]
async fn built_dataset_loads_back_into_an_index() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.json");
    let output = dir.path().join("nested").join("index.json");

    let embedder = HashingEmbedder::new(DIM);
    let corpus: Vec<serde_json::Value> = procedures(&embedder)
        .into_iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "title": p.title,
                "steps": p.steps,
                "source": p.source,
            })
        })
        .collect();
    std::fs::write(&corpus_path, serde_json::to_string_pretty(&corpus).unwrap()).unwrap();

    let count = app::build_index_file(&corpus_path, &output, "2026-10", &embedder)
        .await
        .unwrap();
    assert_eq!(count, 5);

    let index = load_index(&output, SimilarityMetric::Cosine, DIM).unwrap();
    assert_eq!(index.version(), "2026-10");
    assert_eq!(index.len(), 5);

    // A dataset built for another dimension is refused
    assert!(load_index(&output, SimilarityMetric::Cosine, DIM * 2).is_err());

    let engine = RetrievalEngine::new(IndexHandle::new(index), Arc::new(embedder));
    let mut stall = cruise(0);
    stall.angle_of_attack_deg = 17.0;
    let results = engine.retrieve(&stall, 3).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.score.is_finite()));
}

#[test]
fn duplicate_ids_are_rejected_at_build() {
    let result = ProcedureIndex::build(
        "dup",
        3,
        SimilarityMetric::Cosine,
        vec![
            procedure("A", vec![1.0, 0.0, 0.0]),
            procedure("A", vec![0.0, 1.0, 0.0]),
        ],
    );
    assert!(matches!(result, Err(AdvisorError::InvalidInput(_))));
}
