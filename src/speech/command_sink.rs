//! External text-to-speech program (`espeak`, `say`, `piper` wrappers)

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::SpeechSink;
use crate::error::AdvisorError;

/// Placeholder in `args` replaced by the utterance text. When no argument
/// contains it, the text is written to the program's stdin instead.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Spawns one process per utterance and waits for it to exit.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn uses_placeholder(&self) -> bool {
        self.args.iter().any(|a| a.contains(TEXT_PLACEHOLDER))
    }
}

#[async_trait]
impl SpeechSink for CommandSink {
    async fn speak(&self, text: &str) -> Result<(), AdvisorError> {
        let inline = self.uses_placeholder();
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace(TEXT_PLACEHOLDER, text)))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .stdin(if inline { Stdio::null() } else { Stdio::piped() });

        let mut child = cmd
            .spawn()
            .map_err(|e| AdvisorError::SpeechSinkError(format!("spawn {}: {e}", self.program)))?;

        if !inline {
            if let Some(mut stdin) = child.stdin.take() {
                match stdin.write_all(text.as_bytes()).await {
                    Ok(()) => {}
                    // Program exited without reading; its exit status decides
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(AdvisorError::SpeechSinkError(format!("stdin: {e}"))),
                }
                // Close stdin so the program sees EOF
                drop(stdin);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AdvisorError::SpeechSinkError(format!("wait: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AdvisorError::SpeechSinkError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }

    fn sink_name(&self) -> &'static str {
        "command"
    }
}
