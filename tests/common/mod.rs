//! Shared fixtures: flight states, a small procedure index, scripted
//! generation backends and recording speech sinks.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flight_advisor::app::Collaborators;
use flight_advisor::config::{AdvisorConfig, TriggerConfig};
use flight_advisor::detector::Condition;
use flight_advisor::index::{IndexHandle, ProcedureIndex, SimilarityMetric};
use flight_advisor::retrieval::HashingEmbedder;
use flight_advisor::types::{FlightState, GearPosition, Procedure, ProcedureId, ProcedureSource};
use flight_advisor::{AdvisorError, GenerationBackend, Prompt, SpeechSink};

pub const DIM: usize = 128;
pub const BASE_MS: i64 = 1_790_000_000_000;

pub fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(BASE_MS + ms).unwrap()
}

/// Level flight, gear down, nothing abnormal
pub fn cruise(ms: i64) -> FlightState {
    FlightState {
        timestamp: ts(ms),
        gear: GearPosition::Down,
        flap_index: 0,
        spoiler_position: 0.0,
        autopilot_modes: Default::default(),
        airspeed_kt: 220.0,
        angle_of_attack_deg: 3.0,
        altitude_agl_ft: 3_000.0,
    }
}

pub fn gear_up_low(ms: i64) -> FlightState {
    FlightState {
        gear: GearPosition::Up,
        airspeed_kt: 150.0,
        altitude_agl_ft: 420.0,
        ..cruise(ms)
    }
}

pub fn overspeed(ms: i64) -> FlightState {
    FlightState {
        airspeed_kt: 355.0,
        ..cruise(ms)
    }
}

const CORPUS: [(&str, &str, &[&str]); 5] = [
    (
        "QRH-GEAR-01",
        "Landing gear not down on approach",
        &["Landing gear DOWN", "Verify three green", "Go around if not configured by 500 ft"],
    ),
    (
        "QRH-SPD-01",
        "Overspeed recovery airspeed above limit",
        &["Thrust IDLE", "Speedbrakes as required", "Pitch up gently to reduce airspeed"],
    ),
    (
        "QRH-STALL-01",
        "Stall warning high angle of attack",
        &["Pitch nose down", "Thrust as required", "Level wings"],
    ),
    (
        "QRH-FLAP-01",
        "Flap placard speed exceeded",
        &["Reduce airspeed below placard", "Do not retract flaps above placard"],
    ),
    (
        "QRH-AP-01",
        "Autopilot disconnect unexpected",
        &["Fly the aircraft manually", "Check flight mode annunciator"],
    ),
];

pub fn procedures(embedder: &HashingEmbedder) -> Vec<Procedure> {
    CORPUS
        .iter()
        .map(|(id, title, steps)| {
            let mut p = Procedure {
                id: ProcedureId::new(*id),
                title: (*title).to_string(),
                steps: steps.iter().map(|s| (*s).to_string()).collect(),
                embedding: Vec::new(),
                source: ProcedureSource {
                    document: "QRH".to_string(),
                    section: String::new(),
                    revision: "1".to_string(),
                },
            };
            p.embedding = embedder.embed_sync(&p.embedding_text()).unwrap();
            p
        })
        .collect()
}

pub fn test_index() -> IndexHandle {
    let embedder = HashingEmbedder::new(DIM);
    let index =
        ProcedureIndex::build("test-v1", DIM, SimilarityMetric::Cosine, procedures(&embedder))
            .unwrap();
    IndexHandle::new(index)
}

fn trigger(id: &str, description: &str, condition: Condition) -> TriggerConfig {
    TriggerConfig {
        id: id.to_string(),
        description: description.to_string(),
        cooldown_ms: 5_000,
        arm_ms: 0,
        condition,
    }
}

/// Config with two trigger classes, short timeouts, no watcher, history in `dir`
pub fn test_config(dir: &Path) -> AdvisorConfig {
    let mut config = AdvisorConfig::default();
    config.index.watch = false;
    config.index.path = dir.join("index.json");
    config.embedding.dimension = DIM;
    config.storage.history_path = dir.join("history");
    config.dispatch.generation_timeout_ms = 150;
    config.dispatch.retry_backoff_ms = 20;
    config.dispatch.retry_jitter_ms = 0;
    config.dispatch.cancel_grace_ms = 3_000;
    config.triggers = vec![
        trigger(
            "gear-up-low",
            "Landing gear up below 500 ft",
            Condition::GearUpBelow { max_altitude_ft: 500.0 },
        ),
        trigger(
            "overspeed",
            "Airspeed above limit",
            Condition::Overspeed { max_airspeed_kt: 340.0 },
        ),
    ];
    config
}

// ============================================================================
// Scripted generation backend
// ============================================================================

pub enum Reply {
    Text(String),
    /// Never answers (exceeds any timeout)
    Hang,
    Transient,
    Permanent,
}

type Policy = Box<dyn Fn(&Prompt, usize) -> Reply + Send + Sync>;

pub struct ScriptedBackend {
    policy: Policy,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    /// `policy(prompt, call_index)` decides each reply
    pub fn new(
        delay: Duration,
        policy: impl Fn(&Prompt, usize) -> Reply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            policy: Box::new(policy),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers every prompt with its condition text
    pub fn echo(delay: Duration) -> Arc<Self> {
        Self::new(delay, |prompt, _| Reply::Text(format!("Advisory: {}", prompt.condition)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<String, AdvisorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match (self.policy)(prompt, call) {
            Reply::Text(text) => Ok(text),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok("too late".to_string())
            }
            Reply::Transient => Err(AdvisorError::GenerationError {
                message: "503 overloaded".to_string(),
                retryable: true,
            }),
            Reply::Permanent => Err(AdvisorError::GenerationError {
                message: "400 bad request".to_string(),
                retryable: false,
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

// ============================================================================
// Recording speech sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    delay: Duration,
    /// Utterances containing this text fail with a sink error
    fail_on: Option<String>,
    spoken: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn failing_on(delay: Duration, needle: &str) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_on: Some(needle.to_string()),
            ..Self::default()
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSink for RecordingSink {
    async fn speak(&self, text: &str) -> Result<(), AdvisorError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.spoken.lock().unwrap().push(text.to_string());
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.fail_on {
            Some(needle) if text.contains(needle.as_str()) => {
                Err(AdvisorError::SpeechSinkError("audio device busy".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

pub fn collaborators(
    backend: Arc<ScriptedBackend>,
    sink: Arc<RecordingSink>,
) -> Collaborators {
    Collaborators {
        embedder: Arc::new(HashingEmbedder::new(DIM)),
        backend,
        sink,
    }
}
