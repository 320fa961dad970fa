//! Per-advisory generation task: retrieve, assemble, generate.
//!
//! Runs outside the actor so a slow backend never stalls the command loop.
//! Cancellation is observed only before each generation call; an attempt
//! that has started runs to completion or timeout.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::DispatchSettings;
use crate::config::EmptyContextPolicy;
use crate::context::{assemble, assemble_disclaimer, Prompt};
use crate::error::AdvisorError;
use crate::llm::GenerationBackend;
use crate::retrieval::RetrievalEngine;
use crate::types::{AdvisoryId, ProcedureId, Trigger};

/// Generation attempts per advisory (first try plus one retry)
pub const MAX_ATTEMPTS: u32 = 2;

pub(crate) struct GenerationJob {
    pub id: AdvisoryId,
    pub trigger: Trigger,
    pub retrieval: RetrievalEngine,
    pub backend: Arc<dyn GenerationBackend>,
    pub settings: Arc<DispatchSettings>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) enum GenerationReport {
    Generated {
        text: String,
        procedures: Vec<ProcedureId>,
        attempts: u32,
    },
    Failed {
        error: AdvisorError,
        procedures: Vec<ProcedureId>,
        attempts: u32,
    },
    Cancelled {
        procedures: Vec<ProcedureId>,
        attempts: u32,
    },
}

pub(crate) async fn run_generation(job: GenerationJob) -> GenerationReport {
    let (prompt, procedures) = match build_prompt(&job).await {
        Ok(built) => built,
        Err(error) => {
            return GenerationReport::Failed {
                error,
                procedures: Vec::new(),
                attempts: 0,
            }
        }
    };

    let timeout = job.settings.generation_timeout;
    let mut attempts = 0;
    loop {
        if job.cancel.is_cancelled() {
            return GenerationReport::Cancelled { procedures, attempts };
        }
        attempts += 1;

        let error = match tokio::time::timeout(timeout, job.backend.generate(&prompt)).await {
            Ok(Ok(text)) => {
                return GenerationReport::Generated {
                    text,
                    procedures,
                    attempts,
                }
            }
            Ok(Err(e)) => e,
            Err(_) => AdvisorError::GenerationTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
        };

        if !error.is_transient() || attempts >= MAX_ATTEMPTS {
            return GenerationReport::Failed {
                error,
                procedures,
                attempts,
            };
        }

        let delay = retry_delay(&job.settings);
        warn!(
            advisory = %job.id,
            class = %job.trigger.class,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "[Dispatcher] Transient generation failure, retrying"
        );
        tokio::select! {
            () = job.cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Retrieval plus assembly, applying the empty-context policy.
async fn build_prompt(job: &GenerationJob) -> Result<(Prompt, Vec<ProcedureId>), AdvisorError> {
    let results = job
        .retrieval
        .retrieve_for_trigger(&job.trigger, job.settings.k)
        .await?;

    if results.is_empty() {
        return match job.settings.on_empty_context {
            EmptyContextPolicy::Disclaimer => {
                debug!(class = %job.trigger.class, "[Dispatcher] No procedures retrieved, using disclaimer");
                Ok((assemble_disclaimer(&job.trigger)?, Vec::new()))
            }
            EmptyContextPolicy::Suppress => Err(AdvisorError::EmptyContext),
        };
    }

    let procedures = results.iter().map(|r| r.procedure.id.clone()).collect();
    Ok((assemble(&job.trigger, &results)?, procedures))
}

fn retry_delay(settings: &DispatchSettings) -> Duration {
    let jitter_ms = u64::try_from(settings.retry_jitter.as_millis()).unwrap_or(0);
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    settings.retry_backoff + Duration::from_millis(jitter)
}
