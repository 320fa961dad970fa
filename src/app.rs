//! Runtime wiring shared by the binary and integration tests.
//!
//! Builds the index handle, dispatcher actor, history recorder and index
//! watcher from an [`AdvisorConfig`], runs the processing loop over a
//! telemetry source, then drains and shuts everything down.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{defaults, AdvisorConfig};
use crate::detector::StateChangeDetector;
use crate::dispatch::{DispatchSettings, Dispatcher, DispatcherHandle, DispatcherStats};
use crate::index::watcher::{run_index_watcher, WatchTarget};
use crate::index::{build_dataset, load_index, CorpusEntry, IndexHandle, ProcedureIndex};
use crate::llm::{create_backend, GenerationBackend};
use crate::pipeline::{PipelineStats, ProcessingLoop, TelemetrySource};
use crate::retrieval::{Embedder, HashingEmbedder, RetrievalEngine};
use crate::speech::{create_sink, SpeechSink};
use crate::storage::{run_history_recorder, AdvisoryHistory};

/// External collaborators injected into the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub backend: Arc<dyn GenerationBackend>,
    pub sink: Arc<dyn SpeechSink>,
}

impl Collaborators {
    /// Reference collaborators selected by configuration
    pub fn from_config(config: &AdvisorConfig) -> Result<Self> {
        Ok(Self {
            embedder: Arc::new(HashingEmbedder::new(config.embedding.dimension)),
            backend: create_backend(&config.generation)?,
            sink: create_sink(&config.speech),
        })
    }
}

/// Everything the run produced, for the final log line and tests
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub pipeline: PipelineStats,
    pub dispatcher: DispatcherStats,
    pub history_written: u64,
    pub index_swaps: u64,
}

/// Load the configured dataset, or an empty index when it is missing or
/// invalid. Advisories fail with `IndexEmpty` until the watcher installs one.
pub fn load_initial_index(config: &AdvisorConfig) -> ProcedureIndex {
    let path = &config.index.path;
    let dimension = config.embedding.dimension;
    match load_index(path, config.index.metric, dimension) {
        Ok(index) => index,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "[Index] No usable dataset at startup, serving an empty index"
            );
            ProcedureIndex::empty(dimension, config.index.metric)
        }
    }
}

/// Embed a JSON corpus (array of procedures without vectors) into a dataset.
pub async fn build_index_file(
    corpus_path: &Path,
    output: &Path,
    version: &str,
    embedder: &dyn Embedder,
) -> Result<usize> {
    let raw = std::fs::read_to_string(corpus_path)
        .with_context(|| format!("reading corpus {}", corpus_path.display()))?;
    let corpus: Vec<CorpusEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing corpus {}", corpus_path.display()))?;

    let dataset = build_dataset(version, corpus, embedder).await?;
    let count = dataset.procedures.len();

    // Validate before publishing so a watcher never picks up a broken file
    ProcedureIndex::build(
        dataset.version.clone(),
        dataset.dimension,
        Default::default(),
        dataset.procedures.clone(),
    )?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    dataset.save(output)?;
    Ok(count)
}

/// Run the full pipeline over `source` until it ends or `cancel` fires.
///
/// At end of input, advisories still in flight are allowed to finish;
/// on cancellation they are withdrawn.
pub async fn run_pipeline<S: TelemetrySource + ?Sized>(
    config: &AdvisorConfig,
    collaborators: Collaborators,
    source: &mut S,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let index = IndexHandle::new(load_initial_index(config));
    run_pipeline_with_index(config, collaborators, index, source, cancel).await
}

/// [`run_pipeline`] with a caller-provided index handle.
pub async fn run_pipeline_with_index<S: TelemetrySource + ?Sized>(
    config: &AdvisorConfig,
    collaborators: Collaborators,
    index: IndexHandle,
    source: &mut S,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let background = cancel.child_token();

    let watcher = config.index.watch.then(|| {
        tokio::spawn(run_index_watcher(
            WatchTarget {
                path: config.index.path.clone(),
                metric: config.index.metric,
                dimension: config.embedding.dimension,
                poll_interval: Duration::from_millis(config.index.poll_interval_ms),
            },
            index.clone(),
            background.clone(),
        ))
    });

    let retrieval = RetrievalEngine::new(index, collaborators.embedder);
    let dispatcher_cancel = cancel.child_token();
    let (dispatcher, dispatcher_task) = Dispatcher::spawn(
        DispatchSettings::from_config(config),
        retrieval,
        collaborators.backend,
        collaborators.sink,
        dispatcher_cancel.clone(),
    );

    let recorder = if config.storage.enabled {
        let history = AdvisoryHistory::open(&config.storage.history_path).with_context(|| {
            format!("opening advisory history {}", config.storage.history_path.display())
        })?;
        // Ends when the dispatcher's broadcast closes
        Some(tokio::spawn(run_history_recorder(
            history,
            dispatcher.subscribe(),
            CancellationToken::new(),
        )))
    } else {
        None
    };

    let detector = StateChangeDetector::new(config.trigger_classes());
    let pipeline = ProcessingLoop::new(detector, dispatcher.clone(), cancel.clone())
        .run(source)
        .await;

    wait_for_drain(&dispatcher, &cancel).await;
    dispatcher_cancel.cancel();
    drop(dispatcher);
    let dispatcher = dispatcher_task.await.context("dispatcher task panicked")?;

    background.cancel();
    let index_swaps = match watcher {
        Some(task) => task.await.context("index watcher panicked")?,
        None => 0,
    };
    let history_written = match recorder {
        Some(task) => task.await.context("history recorder panicked")?,
        None => 0,
    };

    let summary = RunSummary {
        pipeline,
        dispatcher,
        history_written,
        index_swaps,
    };
    info!(
        states = summary.pipeline.states_processed,
        spoken = summary.dispatcher.spoken,
        failed = summary.dispatcher.failed,
        cancelled = summary.dispatcher.cancelled,
        history = summary.history_written,
        "[Advisor] Run complete"
    );
    Ok(summary)
}

async fn wait_for_drain(dispatcher: &DispatcherHandle, cancel: &CancellationToken) {
    let poll = Duration::from_millis(defaults::DRAIN_POLL_INTERVAL_MS);
    loop {
        match dispatcher.stats().await {
            Ok(stats) if stats.in_flight == 0 => return,
            Ok(stats) => {
                tracing::debug!(in_flight = stats.in_flight, "[Advisor] Waiting for advisories to finish");
            }
            Err(_) => return,
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(poll) => {}
        }
    }
}
