//! Advisor Configuration Module
//!
//! Operator-tunable pipeline settings and the trigger registry, loaded from
//! TOML.
//!
//! ## Loading Order
//!
//! 1. `FLIGHT_ADVISOR_CONFIG` environment variable (path to TOML file)
//! 2. `flight_advisor.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Example
//!
//! ```toml
//! [retrieval]
//! k = 3
//! on_empty_context = "disclaimer"
//!
//! [dispatch]
//! generation_timeout_ms = 2500
//!
//! [[triggers]]
//! id = "gear-up-low"
//! description = "Landing gear up below 500 ft"
//! cooldown_ms = 5000
//! condition = { kind = "gear_up_below", max_altitude_ft = 500.0 }
//! ```

mod advisor_config;
pub mod defaults;

pub use advisor_config::*;
