//! Telemetry processing loop.
//!
//! One worker: read a sample, validate and run it through the detector,
//! forward condition activity and triggers to the dispatcher. Detection is
//! synchronous and cheap; all slow work happens behind the dispatcher.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{TelemetryEvent, TelemetrySource};
use super::PipelineStats;
use crate::detector::StateChangeDetector;
use crate::dispatch::{DispatchOutcome, DispatcherHandle};
use crate::error::AdvisorError;

pub struct ProcessingLoop {
    detector: StateChangeDetector,
    dispatcher: DispatcherHandle,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        detector: StateChangeDetector,
        dispatcher: DispatcherHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            cancel_token,
        }
    }

    /// Run until the source is exhausted, fails, or cancellation.
    pub async fn run<S: TelemetrySource + ?Sized>(mut self, source: &mut S) -> PipelineStats {
        let mut stats = PipelineStats::default();
        info!(source = source.source_name(), "[Pipeline] Processing flight states");

        loop {
            let event = tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("[Pipeline] Shutdown signal received");
                    break;
                }
                result = source.next_event() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!(error = %e, "[Pipeline] Source error");
                        break;
                    }
                },
            };

            let state = match event {
                TelemetryEvent::State(state) => state,
                TelemetryEvent::Malformed { line, error } => {
                    stats.malformed += 1;
                    warn!(line, error = %error, "[Pipeline] Malformed telemetry line skipped");
                    continue;
                }
                TelemetryEvent::Eof => {
                    info!(states = stats.states_processed, "[Pipeline] Source reached end");
                    break;
                }
            };

            let observation = match self.detector.observe(&state) {
                Ok(obs) => obs,
                Err(e) => {
                    stats.rejected += 1;
                    warn!(error = %e, "[Pipeline] Flight state rejected");
                    continue;
                }
            };
            stats.states_processed += 1;

            if let Err(e) = self
                .dispatcher
                .report_conditions(state.timestamp, observation.conditions)
                .await
            {
                warn!(error = %e, "[Pipeline] Dispatcher unavailable, stopping");
                break;
            }

            for trigger in observation.triggers {
                stats.triggers += 1;
                debug!(class = %trigger.class, sequence = trigger.sequence, "[Pipeline] Trigger");
                match self.dispatcher.dispatch(trigger).await {
                    Ok(DispatchOutcome::Accepted(_)) => stats.accepted += 1,
                    Ok(DispatchOutcome::Suppressed { .. }) => stats.suppressed += 1,
                    Err(AdvisorError::DispatcherClosed(reason)) => {
                        stats.dispatch_errors += 1;
                        debug!(reason = %reason, "[Pipeline] Trigger dropped, dispatcher closed");
                    }
                    Err(e) => {
                        stats.dispatch_errors += 1;
                        warn!(error = %e, "[Pipeline] Dispatch failed");
                    }
                }
            }
        }

        info!(
            states = stats.states_processed,
            malformed = stats.malformed,
            rejected = stats.rejected,
            triggers = stats.triggers,
            accepted = stats.accepted,
            suppressed = stats.suppressed,
            "[Pipeline] Stopped"
        );
        stats
    }
}
