//! Context Assembler
//!
//! Turns a trigger plus its retrieval result into a structured prompt:
//! a fixed system preamble, the retrieved procedure texts in retrieval order
//! separated by [`PROCEDURE_DELIMITER`], and a serialized flight state.
//! Assembly is a pure function: identical inputs give byte-identical prompts.

use serde::Serialize;

use crate::error::AdvisorError;
use crate::types::{RetrievalResult, ScoredProcedure, Trigger};

/// Role / system preamble sent with every advisory prompt
pub const SYSTEM_PREAMBLE: &str = "You are a flight-deck safety advisor. \
Your output is read aloud to the crew during flight. \
Use only the procedures provided in the context. \
Be brief, imperative and unambiguous. \
Never contradict a procedure and never invent limits, speeds or altitudes.";

/// Separator placed between procedures in the context block
pub const PROCEDURE_DELIMITER: &str = "\n\n-----\n\n";

/// Context used when retrieval produced nothing and policy allows dispatch
pub const GENERIC_DISCLAIMER: &str = "No matching procedure was found in the indexed corpus. \
Advise the crew to maintain aircraft control first, then refer to the \
Quick Reference Handbook for the applicable procedure.";

/// Structured prompt payload for the generation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    /// Procedure texts (or the generic disclaimer)
    pub context: String,
    /// JSON serialization of the triggering flight state
    pub flight_state: String,
    pub instruction: String,
    /// Trigger class description, for backends that compose text directly
    pub condition: String,
    /// False when built from the generic disclaimer
    pub grounded: bool,
}

impl Prompt {
    /// User-turn text: context, flight state and instruction
    pub fn user_message(&self) -> String {
        format!(
            "PROCEDURES:\n{}\n\nFLIGHT STATE:\n{}\n\nTASK:\n{}",
            self.context, self.flight_state, self.instruction
        )
    }

    /// Single-string rendering (system + user) for completion-style backends
    pub fn render(&self) -> String {
        format!("SYSTEM:\n{}\n\n{}", self.system, self.user_message())
    }
}

/// Build the prompt for `trigger` grounded on `results`.
pub fn assemble(trigger: &Trigger, results: &RetrievalResult) -> Result<Prompt, AdvisorError> {
    if results.is_empty() {
        return Err(AdvisorError::EmptyContext);
    }
    let context = results
        .iter()
        .enumerate()
        .map(|(rank, hit)| procedure_block(rank + 1, hit))
        .collect::<Vec<_>>()
        .join(PROCEDURE_DELIMITER);
    build(trigger, context, true)
}

/// Build an ungrounded prompt carrying the generic safety disclaimer.
pub fn assemble_disclaimer(trigger: &Trigger) -> Result<Prompt, AdvisorError> {
    build(trigger, GENERIC_DISCLAIMER.to_string(), false)
}

fn build(trigger: &Trigger, context: String, grounded: bool) -> Result<Prompt, AdvisorError> {
    let flight_state = serde_json::to_string_pretty(&trigger.state)
        .map_err(|e| AdvisorError::InvalidInput(format!("flight state not serializable: {e}")))?;
    Ok(Prompt {
        system: SYSTEM_PREAMBLE.to_string(),
        context,
        flight_state,
        instruction: format!(
            "Condition: {} (class {}, occurrence {}). \
             Give one spoken advisory of at most two short sentences.",
            trigger.description, trigger.class, trigger.sequence
        ),
        condition: trigger.description.clone(),
        grounded,
    })
}

fn procedure_block(rank: usize, hit: &ScoredProcedure) -> String {
    let p = &hit.procedure;
    let mut source = [p.source.document.as_str(), p.source.section.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !p.source.revision.is_empty() {
        source.push_str(&format!(" rev {}", p.source.revision));
    }
    let source = if source.is_empty() {
        String::new()
    } else {
        format!(" ({})", source.trim())
    };
    format!(
        "[{rank}] {}: {}{source} similarity {:.3}\n{}",
        p.id,
        p.title,
        hit.score,
        p.body()
    )
}
