//! Telemetry source abstraction.
//!
//! Flight states arrive as JSON lines, one `FlightState` per line, from
//! stdin, a file, or a paced replay of a recorded flight.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::types::FlightState;

/// Events produced by a telemetry source.
#[derive(Debug)]
pub enum TelemetryEvent {
    /// A flight state parsed successfully (not yet validated).
    State(FlightState),
    /// A line that could not be parsed; the source keeps going.
    Malformed { line: u64, error: String },
    /// No more data.
    Eof,
}

/// Where flight states come from.
///
/// The processing loop calls [`next_event`](TelemetrySource::next_event) in a
/// `select!` with cancellation.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Returns `Err` only for unrecoverable I/O errors.
    async fn next_event(&mut self) -> Result<TelemetryEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay").
    fn source_name(&self) -> &str;
}

fn parse_line(line_no: u64, line: &str) -> TelemetryEvent {
    match serde_json::from_str::<FlightState>(line) {
        Ok(state) => TelemetryEvent::State(state),
        Err(e) => TelemetryEvent::Malformed {
            line: line_no,
            error: e.to_string(),
        },
    }
}

// ============================================================================
// JSON lines (stdin / file / any async reader)
// ============================================================================

/// Streams JSON-lines flight states from an async reader.
///
/// Used with the simulator: `flight-sim | flight-advisor run`
pub struct JsonLinesSource<R> {
    reader: R,
    name: String,
    line_buffer: String,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: String::with_capacity(512),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("opening telemetry file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TelemetrySource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Result<TelemetryEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(TelemetryEvent::Eof);
            }
            self.line_no += 1;
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(parse_line(self.line_no, line));
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Replay (recorded flight, paced by telemetry timestamps)
// ============================================================================

/// Replays a recorded flight, sleeping the timestamp gap between samples
/// divided by `speed`. `speed <= 0` replays as fast as possible.
pub struct ReplaySource {
    events: VecDeque<TelemetryEvent>,
    speed: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ReplaySource {
    pub fn new(states: Vec<FlightState>, speed: f64) -> Self {
        Self {
            events: states.into_iter().map(TelemetryEvent::State).collect(),
            speed,
            last_timestamp: None,
        }
    }

    /// Load a JSON-lines recording. Malformed lines are kept as
    /// [`TelemetryEvent::Malformed`] so they are counted during replay.
    pub fn load(path: &Path, speed: f64) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay file {}", path.display()))?;
        let events = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| parse_line(i as u64 + 1, line.trim()))
            .collect();
        Ok(Self {
            events,
            speed,
            last_timestamp: None,
        })
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    fn gap(&self, next: DateTime<Utc>) -> Option<Duration> {
        if self.speed <= 0.0 || !self.speed.is_finite() {
            return None;
        }
        let last = self.last_timestamp?;
        let gap = (next - last).to_std().ok()?;
        Some(gap.div_f64(self.speed))
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn next_event(&mut self) -> Result<TelemetryEvent> {
        let Some(event) = self.events.pop_front() else {
            return Ok(TelemetryEvent::Eof);
        };
        if let TelemetryEvent::State(state) = &event {
            if let Some(delay) = self.gap(state.timestamp) {
                tokio::time::sleep(delay).await;
            }
            self.last_timestamp = Some(state.timestamp);
        }
        Ok(event)
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
