//! Template-based advisory generation (offline fallback)
//!
//! Produces a spoken advisory directly from the top-ranked procedure in the
//! prompt context when no model is configured. Output is deterministic and
//! never adds content that is not in the retrieved procedure text.

use async_trait::async_trait;

use super::GenerationBackend;
use crate::context::{Prompt, PROCEDURE_DELIMITER};
use crate::error::AdvisorError;

/// Number of procedure steps read out
const SPOKEN_STEPS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct TemplateBackend;

impl TemplateBackend {
    pub fn new() -> Self {
        Self
    }

    fn compose(prompt: &Prompt) -> String {
        if !prompt.grounded {
            return format!(
                "Caution. {}. Maintain aircraft control and refer to the QRH.",
                prompt.condition
            );
        }

        let top = prompt.context.split(PROCEDURE_DELIMITER).next().unwrap_or_default();
        let mut lines = top.lines();
        let title = lines
            .next()
            .and_then(|header| header.split_once(": "))
            .map(|(_, rest)| rest.split(" (").next().unwrap_or(rest))
            .map(|t| t.split(" similarity ").next().unwrap_or(t).trim().to_string())
            .unwrap_or_default();

        let steps: Vec<String> = lines
            .filter_map(|line| line.split_once(". ").map(|(_, step)| step.trim().to_string()))
            .filter(|s| !s.is_empty())
            .take(SPOKEN_STEPS)
            .collect();

        let mut text = format!("Caution. {}.", prompt.condition);
        if !title.is_empty() {
            text.push_str(&format!(" {title}."));
        }
        for step in steps {
            text.push(' ');
            text.push_str(step.trim_end_matches('.'));
            text.push('.');
        }
        text
    }
}

#[async_trait]
impl GenerationBackend for TemplateBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AdvisorError> {
        Ok(Self::compose(prompt))
    }

    fn backend_name(&self) -> &'static str {
        "template"
    }
}
