//! System-wide default constants.
//!
//! Grouped by subsystem. Trigger thresholds below are example policy values
//! for a generic transport-category profile, not certified aircraft limits;
//! operators supply real ones via `[[triggers]]`.

// ============================================================================
// Configuration discovery
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FLIGHT_ADVISOR_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "flight_advisor.toml";

// ============================================================================
// Retrieval
// ============================================================================

/// Procedures retrieved per trigger.
pub const RETRIEVAL_K: usize = 3;

/// Embedding vector dimension for the built-in hashing embedder.
pub const EMBEDDING_DIMENSION: usize = 256;

/// Default dataset location.
pub const INDEX_PATH: &str = "./data/procedure_index.json";

/// Index dataset mtime poll interval (ms).
pub const INDEX_POLL_INTERVAL_MS: u64 = 2_000;

// ============================================================================
// Dispatch
// ============================================================================

/// Hard timeout on a single generation call (ms).
pub const GENERATION_TIMEOUT_MS: u64 = 2_500;

/// Base delay before the single generation retry (ms).
pub const RETRY_BACKOFF_MS: u64 = 250;

/// Upper bound of uniform random jitter added to the retry delay (ms).
pub const RETRY_JITTER_MS: u64 = 100;

/// How long a trigger's condition must be clear before its pending advisory
/// is withdrawn (ms of telemetry time).
pub const CANCEL_GRACE_MS: u64 = 3_000;

/// Dispatcher command channel capacity.
pub const DISPATCH_COMMAND_BUFFER: usize = 256;

/// Terminal-advisory broadcast capacity (slow subscribers lag, never block).
pub const ADVISORY_BROADCAST_CAPACITY: usize = 64;

/// Poll interval while waiting for in-flight advisories at end of input (ms).
pub const DRAIN_POLL_INTERVAL_MS: u64 = 50;

// ============================================================================
// Generation backend
// ============================================================================

pub const GENERATION_ENDPOINT: &str = "http://127.0.0.1:8080";
pub const GENERATION_MODEL: &str = "advisor";
pub const GENERATION_API_KEY_ENV: &str = "FLIGHT_ADVISOR_API_KEY";
pub const GENERATION_MAX_TOKENS: u32 = 96;
pub const GENERATION_TEMPERATURE: f32 = 0.1;

// ============================================================================
// Speech
// ============================================================================

pub const SPEECH_PROGRAM: &str = "espeak";

/// Simulated speaking time per word for the log sink (ms). 0 = instant.
pub const LOG_SINK_WORD_MS: u64 = 0;

// ============================================================================
// Storage
// ============================================================================

/// Advisory history database directory.
pub const HISTORY_PATH: &str = "./data/advisory_history";

/// Rows returned by history queries when no limit is given.
pub const HISTORY_QUERY_LIMIT: usize = 50;

// ============================================================================
// Trigger registry (example policy values)
// ============================================================================

/// Minimum clear time between fires of the same class (ms).
pub const TRIGGER_COOLDOWN_MS: u64 = 5_000;

/// Gear-up warning below this radio altitude (ft AGL).
pub const GEAR_UP_MAX_ALTITUDE_FT: f64 = 500.0;

/// Airspeed limit (kt).
pub const OVERSPEED_KT: f64 = 340.0;

/// Angle-of-attack stall-margin limit (deg). Held 500 ms to ignore gusts.
pub const HIGH_AOA_DEG: f64 = 14.0;
pub const HIGH_AOA_ARM_MS: u64 = 500;

/// Flap placard table: (detent, max airspeed kt).
pub const FLAP_PLACARDS: [(u8, f64); 4] = [(1, 250.0), (2, 215.0), (3, 185.0), (4, 165.0)];

/// Spoilers deployed inside this band on approach.
pub const SPOILER_MIN_ALTITUDE_FT: f64 = 50.0;
pub const SPOILER_MAX_ALTITUDE_FT: f64 = 1_000.0;
pub const SPOILER_MIN_DEPLOYMENT: f64 = 0.1;
