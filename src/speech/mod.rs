//! Speech sinks
//!
//! A sink renders one utterance at a time; `speak` resolves when the
//! utterance has finished playing. The dispatcher guarantees calls never
//! overlap, so sinks hold no queueing logic of their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{SinkKind, SpeechConfig};
use crate::error::AdvisorError;

mod command_sink;

pub use command_sink::CommandSink;

/// Text-to-speech output
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Render `text`; resolves on completion.
    async fn speak(&self, text: &str) -> Result<(), AdvisorError>;

    fn sink_name(&self) -> &'static str;
}

/// Writes advisories to the log instead of audio.
///
/// Optionally holds each utterance for a simulated duration proportional to
/// its word count, so pacing behaves like a real voice.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    per_word: Duration,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_word_duration(per_word: Duration) -> Self {
        Self { per_word }
    }
}

#[async_trait]
impl SpeechSink for LogSink {
    async fn speak(&self, text: &str) -> Result<(), AdvisorError> {
        tracing::info!(text = %text, "[Speech] ADVISORY");
        if !self.per_word.is_zero() {
            let words = text.split_whitespace().count() as u32;
            tokio::time::sleep(self.per_word * words).await;
        }
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "log"
    }
}

/// Build the configured sink.
pub fn create_sink(config: &SpeechConfig) -> Arc<dyn SpeechSink> {
    match config.sink {
        SinkKind::Log => Arc::new(LogSink::with_word_duration(Duration::from_millis(
            config.simulated_word_ms,
        ))),
        SinkKind::Command => Arc::new(CommandSink::new(config.program.clone(), config.args.clone())),
    }
}
