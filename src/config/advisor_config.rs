//! Advisor configuration loaded from TOML
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it changes. An omitted `[[triggers]]` list means the built-in
//! registry from [`default_triggers`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::detector::{Condition, FlapPlacard, TriggerClass};
use crate::index::SimilarityMetric;
use crate::types::TriggerClassId;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({0}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top level
// ============================================================================

/// Complete advisor configuration.
///
/// Load with [`AdvisorConfig::load`], which searches:
/// 1. `$FLIGHT_ADVISOR_CONFIG`
/// 2. `./flight_advisor.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub retrieval: RetrievalConfig,
    pub dispatch: DispatchConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
    pub storage: StorageConfig,
    pub triggers: Vec<TriggerConfig>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            dispatch: DispatchConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            speech: SpeechConfig::default(),
            storage: StorageConfig::default(),
            triggers: default_triggers(),
        }
    }
}

impl AdvisorConfig {
    /// Load configuration using the standard search order.
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "[Config] Loaded from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "[Config] Failed to load, falling back");
                    }
                }
            } else {
                warn!(path = %path, "[Config] {} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("[Config] Loaded from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "[Config] Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("[Config] No config file found, using built-in defaults");
        Self::default()
    }

    /// Load from an explicit path when given (errors are returned), otherwise
    /// fall back to [`AdvisorConfig::load`].
    pub fn load_or_search(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::load()),
        }
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Serialize to TOML (for `check-config --print`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all sections, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.retrieval.k == 0 {
            errors.push("retrieval.k must be >= 1".to_string());
        }

        let d = &self.dispatch;
        if d.generation_timeout_ms == 0 {
            errors.push("dispatch.generation_timeout_ms must be > 0".to_string());
        }
        if d.command_buffer == 0 {
            errors.push("dispatch.command_buffer must be > 0".to_string());
        }
        if d.cancel_grace_ms == 0 {
            errors.push("dispatch.cancel_grace_ms must be > 0".to_string());
        }

        if self.embedding.dimension == 0 {
            errors.push("embedding.dimension must be > 0".to_string());
        }
        if self.index.watch && self.index.poll_interval_ms == 0 {
            errors.push("index.poll_interval_ms must be > 0 when index.watch is set".to_string());
        }

        let g = &self.generation;
        if g.backend == BackendKind::Http && g.endpoint.trim().is_empty() {
            errors.push("generation.endpoint is required for the http backend".to_string());
        }
        if !g.temperature.is_finite() || g.temperature < 0.0 {
            errors.push(format!("generation.temperature must be finite and >= 0 (got {})", g.temperature));
        }
        if g.max_tokens == 0 {
            errors.push("generation.max_tokens must be > 0".to_string());
        }

        if self.speech.sink == SinkKind::Command && self.speech.program.trim().is_empty() {
            errors.push("speech.program is required for the command sink".to_string());
        }

        if self.triggers.is_empty() {
            errors.push("at least one [[triggers]] entry is required".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.triggers {
            if t.id.trim().is_empty() {
                errors.push("triggers: id must not be empty".to_string());
            } else if !seen.insert(t.id.as_str()) {
                errors.push(format!("triggers: duplicate id '{}'", t.id));
            }
            if t.cooldown_ms == 0 {
                errors.push(format!("triggers.{}: cooldown_ms must be > 0", t.id));
            }
            for problem in t.condition.validate() {
                errors.push(format!("triggers.{}: {problem}", t.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Detector registry built from `[[triggers]]`.
    pub fn trigger_classes(&self) -> Vec<TriggerClass> {
        self.triggers.iter().map(TriggerConfig::to_class).collect()
    }
}

// ============================================================================
// Sections
// ============================================================================

/// What to do when retrieval returns nothing for a trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Dispatch an ungrounded prompt with the generic safety disclaimer
    #[default]
    Disclaimer,
    /// Fail the advisory with `EmptyContext`
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub on_empty_context: EmptyContextPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: defaults::RETRIEVAL_K,
            on_empty_context: EmptyContextPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub generation_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub retry_jitter_ms: u64,
    pub cancel_grace_ms: u64,
    pub command_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            generation_timeout_ms: defaults::GENERATION_TIMEOUT_MS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            retry_jitter_ms: defaults::RETRY_JITTER_MS,
            cancel_grace_ms: defaults::CANCEL_GRACE_MS,
            command_buffer: defaults::DISPATCH_COMMAND_BUFFER,
        }
    }
}

impl DispatchConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn cancel_grace(&self) -> TimeDelta {
        millis(self.cancel_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub path: PathBuf,
    pub metric: SimilarityMetric,
    /// Reload the dataset when its file changes
    pub watch: bool,
    pub poll_interval_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::INDEX_PATH),
            metric: SimilarityMetric::default(),
            watch: true,
            poll_interval_ms: defaults::INDEX_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: defaults::EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Offline template composition
    #[default]
    Template,
    /// OpenAI-compatible chat completions
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: BackendKind,
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token ("" = none)
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            endpoint: defaults::GENERATION_ENDPOINT.to_string(),
            model: defaults::GENERATION_MODEL.to_string(),
            api_key_env: defaults::GENERATION_API_KEY_ENV.to_string(),
            max_tokens: defaults::GENERATION_MAX_TOKENS,
            temperature: defaults::GENERATION_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Log,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub sink: SinkKind,
    pub program: String,
    /// Program arguments; `{text}` is replaced by the utterance
    pub args: Vec<String>,
    pub simulated_word_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            program: defaults::SPEECH_PROGRAM.to_string(),
            args: Vec::new(),
            simulated_word_ms: defaults::LOG_SINK_WORD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist terminal advisories
    pub enabled: bool,
    pub history_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_path: PathBuf::from(defaults::HISTORY_PATH),
        }
    }
}

// ============================================================================
// Triggers
// ============================================================================

/// One `[[triggers]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub id: String,
    pub description: String,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub arm_ms: u64,
    pub condition: Condition,
}

fn default_cooldown_ms() -> u64 {
    defaults::TRIGGER_COOLDOWN_MS
}

impl TriggerConfig {
    pub fn to_class(&self) -> TriggerClass {
        TriggerClass {
            id: TriggerClassId::new(&self.id),
            description: self.description.clone(),
            condition: self.condition.clone(),
            cooldown: millis(self.cooldown_ms),
            arm_delay: millis(self.arm_ms),
        }
    }
}

fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn entry(id: &str, description: &str, arm_ms: u64, condition: Condition) -> TriggerConfig {
    TriggerConfig {
        id: id.to_string(),
        description: description.to_string(),
        cooldown_ms: defaults::TRIGGER_COOLDOWN_MS,
        arm_ms,
        condition,
    }
}

/// Built-in trigger registry (example thresholds from `config::defaults`).
pub fn default_triggers() -> Vec<TriggerConfig> {
    vec![
        entry(
            "gear-up-low",
            "Landing gear up below 500 ft",
            0,
            Condition::GearUpBelow {
                max_altitude_ft: defaults::GEAR_UP_MAX_ALTITUDE_FT,
            },
        ),
        entry(
            "overspeed",
            "Airspeed above limit",
            0,
            Condition::Overspeed {
                max_airspeed_kt: defaults::OVERSPEED_KT,
            },
        ),
        entry(
            "high-aoa",
            "Angle of attack high, stall margin low",
            defaults::HIGH_AOA_ARM_MS,
            Condition::HighAngleOfAttack {
                max_aoa_deg: defaults::HIGH_AOA_DEG,
            },
        ),
        entry(
            "flap-overspeed",
            "Airspeed above flap placard",
            0,
            Condition::FlapOverspeed {
                placards: defaults::FLAP_PLACARDS
                    .iter()
                    .map(|&(flap_index, max_airspeed_kt)| FlapPlacard {
                        flap_index,
                        max_airspeed_kt,
                    })
                    .collect(),
            },
        ),
        entry(
            "spoilers-extended",
            "Spoilers extended on approach",
            0,
            Condition::SpoilersExtended {
                min_altitude_ft: defaults::SPOILER_MIN_ALTITUDE_FT,
                max_altitude_ft: defaults::SPOILER_MAX_ALTITUDE_FT,
                min_deployment: defaults::SPOILER_MIN_DEPLOYMENT,
            },
        ),
        entry(
            "autopilot-disconnect",
            "Autopilot disconnected",
            0,
            Condition::AutopilotDisconnect,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AdvisorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.trigger_classes().len(), 6);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AdvisorConfig::from_toml_str(
            r#"
[retrieval]
k = 5

[dispatch]
generation_timeout_ms = 800
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.retrieval.on_empty_context, EmptyContextPolicy::Disclaimer);
        assert_eq!(config.dispatch.generation_timeout(), Duration::from_millis(800));
        assert_eq!(config.dispatch.retry_backoff_ms, defaults::RETRY_BACKOFF_MS);
        assert_eq!(config.triggers.len(), 6);
    }

    #[test]
    fn triggers_table_replaces_registry() {
        let config = AdvisorConfig::from_toml_str(
            r#"
[[triggers]]
id = "gear"
description = "Gear up low"
cooldown_ms = 2000
condition = { kind = "gear_up_below", max_altitude_ft = 750.0 }
"#,
        )
        .unwrap();
        let classes = config.trigger_classes();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].cooldown, TimeDelta::seconds(2));
        assert_eq!(classes[0].arm_delay, TimeDelta::zero());
        assert_eq!(
            classes[0].condition,
            Condition::GearUpBelow { max_altitude_ft: 750.0 }
        );
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = AdvisorConfig::default();
        config.retrieval.k = 0;
        config.dispatch.generation_timeout_ms = 0;
        config.embedding.dimension = 0;
        config.generation.backend = BackendKind::Http;
        config.generation.endpoint = String::new();
        config.speech.sink = SinkKind::Command;
        config.speech.program = " ".to_string();
        config.triggers.push(config.triggers[0].clone());

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("duplicate id 'gear-up-low'")));
    }

    #[test]
    fn toml_roundtrip_of_defaults() {
        let config = AdvisorConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(AdvisorConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let err = AdvisorConfig::load_from_file(Path::new("/nonexistent/flight.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
