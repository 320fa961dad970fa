//! Polling-based index dataset watcher.
//!
//! Checks the dataset file's mtime every poll interval. When a change is
//! detected, debounces (the offline build may still be writing), reloads the
//! dataset and swaps it into the live [`IndexHandle`]. A failed reload keeps
//! the previous index serving.
//!
//! The first poll always reads the file, so a dataset written after startup
//! but before the watcher ran is still picked up. A reload whose version
//! matches the live index is not swapped.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use super::{dataset, IndexHandle, SimilarityMetric};

/// Debounce delay after detecting a change.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Where and how to reload the index from
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub metric: SimilarityMetric,
    pub dimension: usize,
    pub poll_interval: Duration,
}

/// Run the index watcher loop until `cancel` fires.
///
/// Returns the number of successful swaps.
pub async fn run_index_watcher(
    target: WatchTarget,
    handle: IndexHandle,
    cancel: CancellationToken,
) -> u64 {
    tracing::info!(path = %target.path.display(), "[IndexWatcher] Started");

    let mut last_mtime: Option<SystemTime> = None;
    let mut swaps = 0u64;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(target.poll_interval) => {}
        }

        let Some(current) = get_mtime(&target.path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %target.path.display(),
                    "[IndexWatcher] Dataset not accessible, keeping current index"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(DEBOUNCE_DELAY) => {}
        }
        if get_mtime(&target.path) != Some(current) {
            // Still being written; pick it up next cycle
            continue;
        }
        last_mtime = Some(current);

        match dataset::load_index(&target.path, target.metric, target.dimension) {
            Ok(index) if index.version() == handle.snapshot().version() => {
                tracing::debug!(version = %index.version(), "[IndexWatcher] Dataset already live");
            }
            Ok(index) => {
                handle.replace(index);
                swaps += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "[IndexWatcher] Reload failed, keeping previous index");
            }
        }
    }

    tracing::info!(swaps, "[IndexWatcher] Stopped");
    swaps
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
