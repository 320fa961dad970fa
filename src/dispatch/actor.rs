//! Dispatcher actor and handle

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::generation::{run_generation, GenerationJob, GenerationReport};
use super::{AdvisoryTicket, DispatchOutcome, DispatchSettings, DispatcherStats};
use crate::detector::ConditionReport;
use crate::error::AdvisorError;
use crate::llm::GenerationBackend;
use crate::retrieval::RetrievalEngine;
use crate::speech::SpeechSink;
use crate::types::{Advisory, AdvisoryId, AdvisoryStatus, CancelReason, Trigger, TriggerClassId};

// ============================================================================
// Commands
// ============================================================================

enum Command {
    Dispatch {
        trigger: Trigger,
        reply: oneshot::Sender<Result<DispatchOutcome, AdvisorError>>,
    },
    /// Condition activity for every class on one telemetry sample
    Conditions {
        at: DateTime<Utc>,
        reports: Vec<ConditionReport>,
    },
    Stats {
        reply: oneshot::Sender<DispatcherStats>,
    },
    GenerationDone {
        id: AdvisoryId,
        report: GenerationReport,
    },
    SpeechDone {
        id: AdvisoryId,
        result: Result<(), AdvisorError>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable handle to the dispatcher actor
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<Advisory>,
}

fn closed() -> AdvisorError {
    AdvisorError::DispatcherClosed("dispatcher actor stopped".to_string())
}

impl DispatcherHandle {
    /// Offer a trigger. Returns once the dispatcher has accepted or
    /// suppressed it; generation continues in the background.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<DispatchOutcome, AdvisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Dispatch { trigger, reply })
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Report per-class condition activity for a sample taken at `at`.
    pub async fn report_conditions(
        &self,
        at: DateTime<Utc>,
        reports: Vec<ConditionReport>,
    ) -> Result<(), AdvisorError> {
        self.tx
            .send(Command::Conditions { at, reports })
            .await
            .map_err(|_| closed())
    }

    pub async fn stats(&self) -> Result<DispatcherStats, AdvisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stats { reply })
            .await
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    /// Stream of advisories reaching a terminal state (Spoken, Failed, Cancelled).
    pub fn subscribe(&self) -> broadcast::Receiver<Advisory> {
        self.events.subscribe()
    }
}

// ============================================================================
// Actor
// ============================================================================

struct InFlight {
    class: TriggerClassId,
    state: watch::Sender<Advisory>,
    cancel: CancellationToken,
    cancel_reason: Option<CancelReason>,
}

/// Single owner of the in-flight set, speech queue and condition tracking
pub struct Dispatcher {
    settings: Arc<DispatchSettings>,
    retrieval: RetrievalEngine,
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn SpeechSink>,
    cancel: CancellationToken,
    rx: mpsc::Receiver<Command>,
    /// Weak so the actor stops once every handle and worker task is gone
    tx: mpsc::WeakSender<Command>,
    events: broadcast::Sender<Advisory>,
    advisories: HashMap<AdvisoryId, InFlight>,
    by_class: HashMap<TriggerClassId, AdvisoryId>,
    clear_since: HashMap<TriggerClassId, DateTime<Utc>>,
    speech_queue: VecDeque<AdvisoryId>,
    speaking: Option<AdvisoryId>,
    shutting_down: bool,
    stats: DispatcherStats,
}

impl Dispatcher {
    /// Create the actor and its handle. `cancel` is the shutdown token;
    /// each advisory gets a child of it.
    pub fn new(
        settings: DispatchSettings,
        retrieval: RetrievalEngine,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn SpeechSink>,
        cancel: CancellationToken,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(settings.command_buffer);
        let (events, _) = broadcast::channel(settings.broadcast_capacity.max(1));

        let actor = Self {
            settings: Arc::new(settings),
            retrieval,
            backend,
            sink,
            cancel,
            rx,
            tx: tx.downgrade(),
            events: events.clone(),
            advisories: HashMap::new(),
            by_class: HashMap::new(),
            clear_since: HashMap::new(),
            speech_queue: VecDeque::new(),
            speaking: None,
            shutting_down: false,
            stats: DispatcherStats::default(),
        };

        (actor, DispatcherHandle { tx, events })
    }

    /// Create and spawn the actor on the current runtime.
    pub fn spawn(
        settings: DispatchSettings,
        retrieval: RetrievalEngine,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn SpeechSink>,
        cancel: CancellationToken,
    ) -> (DispatcherHandle, JoinHandle<DispatcherStats>) {
        let (actor, handle) = Self::new(settings, retrieval, backend, sink, cancel);
        (handle, tokio::spawn(actor.run()))
    }

    /// Run the command loop.
    ///
    /// After shutdown is requested the loop keeps draining worker reports
    /// until no advisory is in flight and nothing is being spoken.
    pub async fn run(mut self) -> DispatcherStats {
        info!(
            backend = self.backend.backend_name(),
            sink = self.sink.sink_name(),
            timeout_ms = self.settings.generation_timeout.as_millis() as u64,
            "[Dispatcher] Started"
        );

        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled(), if !self.shutting_down => self.begin_shutdown(),
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }

            if self.shutting_down && self.advisories.is_empty() && self.speaking.is_none() {
                break;
            }
        }

        let stats = self.snapshot_stats();
        info!(
            spoken = stats.spoken,
            failed = stats.failed,
            cancelled = stats.cancelled,
            suppressed = stats.suppressed,
            "[Dispatcher] Stopped"
        );
        stats
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Dispatch { trigger, reply } => {
                let outcome = self.on_dispatch(trigger);
                let _ = reply.send(outcome);
            }
            Command::Conditions { at, reports } => self.on_conditions(at, reports),
            Command::Stats { reply } => {
                let _ = reply.send(self.snapshot_stats());
            }
            Command::GenerationDone { id, report } => self.on_generation_done(id, report),
            Command::SpeechDone { id, result } => self.on_speech_done(id, result),
        }
    }

    fn on_dispatch(&mut self, trigger: Trigger) -> Result<DispatchOutcome, AdvisorError> {
        if self.shutting_down {
            return Err(AdvisorError::DispatcherClosed("shutting down".to_string()));
        }

        if let Some(&existing) = self.by_class.get(&trigger.class) {
            self.stats.suppressed += 1;
            debug!(
                class = %trigger.class,
                sequence = trigger.sequence,
                in_flight = %existing,
                "[Dispatcher] Suppressed, class already in flight"
            );
            return Ok(DispatchOutcome::Suppressed {
                class: trigger.class,
                in_flight: existing,
            });
        }

        let Some(tx) = self.tx.upgrade() else {
            return Err(closed());
        };

        let class = trigger.class.clone();
        let advisory = Advisory::pending(trigger.clone());
        let id = advisory.id;
        let (state, state_rx) = watch::channel(advisory);
        let cancel = self.cancel.child_token();

        // A fresh trigger means the condition is active right now
        self.clear_since.remove(&class);
        self.advisories.insert(
            id,
            InFlight {
                class: class.clone(),
                state,
                cancel: cancel.clone(),
                cancel_reason: None,
            },
        );
        self.by_class.insert(class.clone(), id);
        self.stats.accepted += 1;

        info!(
            advisory = %id,
            class = %class,
            sequence = trigger.sequence,
            "[Dispatcher] Trigger accepted"
        );

        let job = GenerationJob {
            id,
            trigger,
            retrieval: self.retrieval.clone(),
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
            cancel,
        };
        tokio::spawn(async move {
            let report = run_generation(job).await;
            let _ = tx.send(Command::GenerationDone { id, report }).await;
        });

        Ok(DispatchOutcome::Accepted(AdvisoryTicket::new(id, state_rx)))
    }

    fn on_conditions(&mut self, at: DateTime<Utc>, reports: Vec<ConditionReport>) {
        for report in reports {
            if report.active {
                self.clear_since.remove(&report.class);
                continue;
            }

            let since = *self.clear_since.entry(report.class.clone()).or_insert(at);
            if at - since < self.settings.cancel_grace {
                continue;
            }

            let Some(id) = self.by_class.get(&report.class).copied() else {
                continue;
            };
            if Some(id) == self.speaking {
                continue;
            }
            let Some(entry) = self.advisories.get_mut(&id) else {
                continue;
            };
            if entry.cancel.is_cancelled() {
                continue;
            }
            entry.cancel_reason = Some(CancelReason::ConditionCleared);
            entry.cancel.cancel();
            info!(
                advisory = %id,
                class = %report.class,
                clear_ms = (at - since).num_milliseconds(),
                "[Dispatcher] Condition cleared, withdrawing advisory"
            );

            // Already generated and waiting for the sink: release the slot now
            if let Some(pos) = self.speech_queue.iter().position(|&queued| queued == id) {
                self.speech_queue.remove(pos);
                self.withdraw(id, |_| {});
            }
        }
    }

    fn on_generation_done(&mut self, id: AdvisoryId, report: GenerationReport) {
        let Some(entry) = self.advisories.get(&id) else {
            return;
        };

        match report {
            GenerationReport::Generated {
                text,
                procedures,
                attempts,
            } => {
                self.stats.retries += u64::from(attempts.saturating_sub(1));
                entry.state.send_modify(|a| {
                    a.text = Some(text);
                    a.procedures = procedures;
                    a.attempts = attempts;
                    a.transition(AdvisoryStatus::Generated);
                });
                debug!(advisory = %id, class = %entry.class, attempts, "[Dispatcher] Advisory generated");
                self.speech_queue.push_back(id);
                self.pump_speech();
            }
            GenerationReport::Failed {
                error,
                procedures,
                attempts,
            } => {
                self.stats.retries += u64::from(attempts.saturating_sub(1));
                warn!(
                    advisory = %id,
                    class = %entry.class,
                    error = %error,
                    kind = error.kind(),
                    attempts,
                    "[Dispatcher] Advisory failed"
                );
                self.finish(id, |a| {
                    a.failure = Some(error);
                    a.procedures = procedures;
                    a.attempts = attempts;
                    a.transition(AdvisoryStatus::Failed);
                });
            }
            GenerationReport::Cancelled {
                procedures,
                attempts,
            } => {
                self.stats.retries += u64::from(attempts.saturating_sub(1));
                self.withdraw(id, |a| {
                    a.procedures = procedures;
                    a.attempts = attempts;
                });
            }
        }
    }

    /// Start the next utterance if the sink is idle.
    fn pump_speech(&mut self) {
        while self.speaking.is_none() {
            let Some(id) = self.speech_queue.pop_front() else {
                break;
            };
            let Some(entry) = self.advisories.get(&id) else {
                continue;
            };
            if entry.cancel.is_cancelled() {
                self.withdraw(id, |_| {});
                continue;
            }
            let Some(tx) = self.tx.upgrade() else {
                self.withdraw(id, |_| {});
                continue;
            };

            let text = entry.state.borrow().text.clone().unwrap_or_default();
            let sink = Arc::clone(&self.sink);
            self.speaking = Some(id);
            debug!(advisory = %id, queued = self.speech_queue.len(), "[Dispatcher] Speaking");
            tokio::spawn(async move {
                let result = sink.speak(&text).await;
                let _ = tx.send(Command::SpeechDone { id, result }).await;
            });
        }
    }

    fn on_speech_done(&mut self, id: AdvisoryId, result: Result<(), AdvisorError>) {
        if self.speaking == Some(id) {
            self.speaking = None;
        }

        let defect = result.err().map(|e| {
            warn!(advisory = %id, error = %e, "[Dispatcher] Speech sink error, advisory marked delivered");
            e.to_string()
        });
        self.finish(id, |a| {
            a.speech_defect = defect;
            a.transition(AdvisoryStatus::Spoken);
        });

        self.pump_speech();
    }

    fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        info!(
            in_flight = self.advisories.len(),
            queued = self.speech_queue.len(),
            "[Dispatcher] Shutdown requested, withdrawing pending advisories"
        );

        // Child tokens are already cancelled with the root
        for entry in self.advisories.values_mut() {
            entry.cancel_reason.get_or_insert(CancelReason::Shutdown);
        }

        let queued: Vec<AdvisoryId> = self.speech_queue.drain(..).collect();
        for id in queued {
            self.withdraw(id, |_| {});
        }
    }

    fn withdraw(&mut self, id: AdvisoryId, update: impl FnOnce(&mut Advisory)) {
        let reason = self
            .advisories
            .get(&id)
            .and_then(|e| e.cancel_reason)
            .unwrap_or(CancelReason::Shutdown);
        self.finish(id, |a| {
            update(a);
            a.cancel_reason = Some(reason);
            a.transition(AdvisoryStatus::Cancelled);
        });
    }

    /// Apply the terminal transition, release the class slot and publish.
    fn finish(&mut self, id: AdvisoryId, update: impl FnOnce(&mut Advisory)) {
        let Some(entry) = self.advisories.remove(&id) else {
            return;
        };
        if self.by_class.get(&entry.class) == Some(&id) {
            self.by_class.remove(&entry.class);
        }

        entry.state.send_modify(update);
        let advisory = entry.state.borrow().clone();

        match advisory.status {
            AdvisoryStatus::Spoken => {
                self.stats.spoken += 1;
                if advisory.speech_defect.is_some() {
                    self.stats.speech_defects += 1;
                }
            }
            AdvisoryStatus::Failed => self.stats.failed += 1,
            AdvisoryStatus::Cancelled => self.stats.cancelled += 1,
            AdvisoryStatus::Pending | AdvisoryStatus::Generated => {}
        }

        info!(
            advisory = %id,
            class = %entry.class,
            status = %advisory.status,
            attempts = advisory.attempts,
            "[Dispatcher] Advisory {}",
            advisory.status
        );

        // No subscribers is fine
        let _ = self.events.send(advisory);
    }

    fn snapshot_stats(&self) -> DispatcherStats {
        DispatcherStats {
            in_flight: self.advisories.len(),
            queued: self.speech_queue.len(),
            speaking: self.speaking.is_some(),
            ..self.stats.clone()
        }
    }
}
