//! Advisory history (sled)
//!
//! Every advisory that reaches a terminal state is stored as JSON.
//!
//! Key: trigger `fired_at` as big-endian epoch milliseconds followed by the
//! advisory uuid bytes, so iteration is chronological and same-millisecond
//! advisories never collide.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::StorageError;
use crate::types::{Advisory, AdvisoryStatus};

const KEY_LEN: usize = 8 + 16;

fn ts_prefix(ts: DateTime<Utc>) -> [u8; 8] {
    u64::try_from(ts.timestamp_millis()).unwrap_or(0).to_be_bytes()
}

fn key_for(advisory: &Advisory) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..8].copy_from_slice(&ts_prefix(advisory.trigger.fired_at));
    key[8..].copy_from_slice(advisory.id.0.as_bytes());
    key
}

/// Decode one stored row, logging (and skipping) rows that cannot be read.
fn decode_row(item: sled::Result<(sled::IVec, sled::IVec)>) -> Option<Advisory> {
    let (key, value) = match item {
        Ok(row) => row,
        Err(e) => {
            warn!(error = %e, "[History] Failed to read row");
            return None;
        }
    };
    match serde_json::from_slice::<Advisory>(&value) {
        Ok(advisory) => Some(advisory),
        Err(e) => {
            warn!(key = ?key.as_ref(), error = %e, "[History] Skipping undecodable row");
            None
        }
    }
}

/// Persistent log of terminal advisories
#[derive(Clone)]
pub struct AdvisoryHistory {
    db: Arc<sled::Db>,
}

impl AdvisoryHistory {
    /// Open or create the history database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// In-memory database, discarded on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Store an advisory. Non-terminal advisories are rejected.
    pub fn record(&self, advisory: &Advisory) -> Result<(), StorageError> {
        if advisory.status.is_in_flight() {
            return Err(StorageError::NotTerminal(advisory.status));
        }
        let value = serde_json::to_vec(advisory)?;
        self.db.insert(key_for(advisory), value)?;
        Ok(())
    }

    /// Most recent `limit` advisories, newest first
    pub fn recent(&self, limit: usize) -> Vec<Advisory> {
        self.db
            .iter()
            .rev()
            .filter_map(decode_row)
            .take(limit)
            .collect()
    }

    /// Advisories fired within `[start, end]`, oldest first
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Advisory> {
        let mut lo = [0u8; KEY_LEN];
        lo[..8].copy_from_slice(&ts_prefix(start));
        let mut hi = [0xFFu8; KEY_LEN];
        hi[..8].copy_from_slice(&ts_prefix(end));

        self.db
            .range(lo..=hi)
            .filter_map(decode_row)
            .collect()
    }

    /// Count by terminal status: (spoken, failed, cancelled)
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.db
            .iter()
            .filter_map(decode_row)
            .fold((0, 0, 0), |(s, f, c), a| match a.status {
                AdvisoryStatus::Spoken => (s + 1, f, c),
                AdvisoryStatus::Failed => (s, f + 1, c),
                AdvisoryStatus::Cancelled => (s, f, c + 1),
                AdvisoryStatus::Pending | AdvisoryStatus::Generated => (s, f, c),
            })
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Persist every terminal advisory from the dispatcher until the broadcast
/// closes or `cancel` fires. Returns the number of records written.
pub async fn run_history_recorder(
    history: AdvisoryHistory,
    mut events: broadcast::Receiver<Advisory>,
    cancel: CancellationToken,
) -> u64 {
    let mut written = 0u64;
    loop {
        let advisory = tokio::select! {
            () = cancel.cancelled() => break,
            msg = events.recv() => match msg {
                Ok(advisory) => advisory,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "[History] Recorder lagged, advisories not persisted");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        match history.record(&advisory) {
            Ok(()) => written += 1,
            Err(e) => warn!(advisory = %advisory.id, error = %e, "[History] Failed to persist advisory"),
        }
    }

    // Drain whatever was already published before shutdown
    while let Ok(advisory) = events.try_recv() {
        if history.record(&advisory).is_ok() {
            written += 1;
        }
    }

    if let Err(e) = history.flush() {
        warn!(error = %e, "[History] Flush failed");
    }
    info!(written, total = history.count(), "[History] Recorder stopped");
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlightState, GearPosition, Trigger, TriggerClassId};

    fn advisory(at_ms: i64, status: AdvisoryStatus) -> Advisory {
        let ts = DateTime::<Utc>::from_timestamp_millis(1_790_000_000_000 + at_ms).unwrap();
        let mut a = Advisory::pending(Trigger {
            class: TriggerClassId::new("gear-up-low"),
            description: "Gear up".to_string(),
            state: FlightState {
                timestamp: ts,
                gear: GearPosition::Up,
                flap_index: 0,
                spoiler_position: 0.0,
                autopilot_modes: Default::default(),
                airspeed_kt: 150.0,
                angle_of_attack_deg: 4.0,
                altitude_agl_ft: 300.0,
            },
            fired_at: ts,
            sequence: 1,
        });
        a.transition(status);
        a
    }

    #[test]
    fn recent_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = AdvisoryHistory::open(dir.path().join("history")).unwrap();
        history.record(&advisory(2_000, AdvisoryStatus::Spoken)).unwrap();
        history.record(&advisory(1_000, AdvisoryStatus::Failed)).unwrap();
        history.record(&advisory(3_000, AdvisoryStatus::Cancelled)).unwrap();

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, AdvisoryStatus::Cancelled);
        assert_eq!(recent[1].status, AdvisoryStatus::Spoken);
        assert_eq!(history.status_counts(), (1, 1, 1));
    }

    #[test]
    fn same_millisecond_advisories_do_not_collide() {
        let history = AdvisoryHistory::temporary().unwrap();
        history.record(&advisory(0, AdvisoryStatus::Spoken)).unwrap();
        history.record(&advisory(0, AdvisoryStatus::Spoken)).unwrap();
        assert_eq!(history.count(), 2);
    }

    #[test]
    fn range_is_inclusive_and_chronological() {
        let history = AdvisoryHistory::temporary().unwrap();
        for ms in [0, 1_000, 2_000, 3_000] {
            history.record(&advisory(ms, AdvisoryStatus::Spoken)).unwrap();
        }
        let base = DateTime::<Utc>::from_timestamp_millis(1_790_000_000_000).unwrap();
        let hits = history.range(
            base + chrono::TimeDelta::seconds(1),
            base + chrono::TimeDelta::seconds(2),
        );
        assert_eq!(hits.len(), 2);
        assert!(hits[0].trigger.fired_at < hits[1].trigger.fired_at);
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let history = AdvisoryHistory::temporary().unwrap();
        history.record(&advisory(0, AdvisoryStatus::Spoken)).unwrap();
        history.record(&advisory(2_000, AdvisoryStatus::Failed)).unwrap();
        let mut key = [0u8; KEY_LEN];
        key[..8].copy_from_slice(&ts_prefix(
            DateTime::<Utc>::from_timestamp_millis(1_790_000_001_000).unwrap(),
        ));
        history.db.insert(key, &b"not json"[..]).unwrap();

        assert_eq!(history.count(), 3);
        assert_eq!(history.recent(10).len(), 2);
        assert_eq!(history.status_counts(), (1, 1, 0));
        let base = DateTime::<Utc>::from_timestamp_millis(1_790_000_000_000).unwrap();
        assert_eq!(history.range(base, base + chrono::TimeDelta::seconds(5)).len(), 2);
    }

    #[test]
    fn in_flight_advisories_are_rejected() {
        let history = AdvisoryHistory::temporary().unwrap();
        let err = history.record(&advisory(0, AdvisoryStatus::Pending)).unwrap_err();
        assert!(matches!(err, StorageError::NotTerminal(AdvisoryStatus::Pending)));
    }

    #[tokio::test]
    async fn recorder_persists_broadcast_advisories() {
        let history = AdvisoryHistory::temporary().unwrap();
        let (tx, rx) = broadcast::channel(8);
        let recorder = tokio::spawn(run_history_recorder(
            history.clone(),
            rx,
            CancellationToken::new(),
        ));
        tx.send(advisory(0, AdvisoryStatus::Spoken)).unwrap();
        tx.send(advisory(1, AdvisoryStatus::Failed)).unwrap();
        drop(tx);
        assert_eq!(recorder.await.unwrap(), 2);
        assert_eq!(history.count(), 2);
    }
}
