//! Flight-state snapshot types: FlightState, GearPosition, AutopilotMode

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;

// ============================================================================
// Discrete Controls
// ============================================================================

/// Landing gear position as reported by the gear selector / position sensors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GearPosition {
    Up,
    #[default]
    Down,
    /// Gear travelling between up and down locks
    Transit,
}

impl std::fmt::Display for GearPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GearPosition::Up => write!(f, "Up"),
            GearPosition::Down => write!(f, "Down"),
            GearPosition::Transit => write!(f, "In Transit"),
        }
    }
}

/// Active autopilot / autothrottle modes
///
/// Stored in a `BTreeSet` on the snapshot so serialization order is stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotMode {
    /// Autopilot engaged (any lateral/vertical mode)
    Engaged,
    HeadingHold,
    AltitudeHold,
    VerticalSpeed,
    Navigation,
    Approach,
    Autothrottle,
}

impl AutopilotMode {
    /// Short annunciator code for logging
    pub fn short_code(&self) -> &'static str {
        match self {
            AutopilotMode::Engaged => "AP",
            AutopilotMode::HeadingHold => "HDG",
            AutopilotMode::AltitudeHold => "ALT",
            AutopilotMode::VerticalSpeed => "VS",
            AutopilotMode::Navigation => "NAV",
            AutopilotMode::Approach => "APP",
            AutopilotMode::Autothrottle => "A/THR",
        }
    }
}

impl std::fmt::Display for AutopilotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

// ============================================================================
// Flight State Snapshot
// ============================================================================

/// Immutable flight-state snapshot produced by the telemetry source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightState {
    /// Sample time (UTC). Must be non-decreasing within one stream.
    pub timestamp: DateTime<Utc>,

    // === Discrete controls ===
    pub gear: GearPosition,
    /// Flap lever detent (0 = clean)
    pub flap_index: u8,
    /// Spoiler / speed-brake deployment, 0.0 (stowed) to 1.0 (full)
    pub spoiler_position: f64,
    #[serde(default)]
    pub autopilot_modes: BTreeSet<AutopilotMode>,

    // === Continuous measurements ===
    /// Indicated airspeed (kt)
    pub airspeed_kt: f64,
    /// Angle of attack (degrees)
    pub angle_of_attack_deg: f64,
    /// Radio altitude above ground level (ft)
    pub altitude_agl_ft: f64,
}

impl FlightState {
    /// Reject snapshots that cannot have come from a working sensor suite.
    pub fn validate(&self) -> Result<(), AdvisorError> {
        let continuous = [
            ("airspeed_kt", self.airspeed_kt),
            ("angle_of_attack_deg", self.angle_of_attack_deg),
            ("altitude_agl_ft", self.altitude_agl_ft),
            ("spoiler_position", self.spoiler_position),
        ];
        for (name, value) in continuous {
            if !value.is_finite() {
                return Err(AdvisorError::InvalidInput(format!(
                    "{name} must be finite (got {value})"
                )));
            }
        }
        if self.airspeed_kt < 0.0 {
            return Err(AdvisorError::InvalidInput(format!(
                "airspeed_kt must be >= 0 (got {:.1})",
                self.airspeed_kt
            )));
        }
        if self.angle_of_attack_deg.abs() > 90.0 {
            return Err(AdvisorError::InvalidInput(format!(
                "angle_of_attack_deg out of range (got {:.1})",
                self.angle_of_attack_deg
            )));
        }
        if !(0.0..=1.0).contains(&self.spoiler_position) {
            return Err(AdvisorError::InvalidInput(format!(
                "spoiler_position must be within 0.0..=1.0 (got {:.2})",
                self.spoiler_position
            )));
        }
        Ok(())
    }

    pub fn has_mode(&self, mode: AutopilotMode) -> bool {
        self.autopilot_modes.contains(&mode)
    }

    /// One-line human summary used in retrieval queries and logs
    pub fn summary(&self) -> String {
        let modes = if self.autopilot_modes.is_empty() {
            "manual".to_string()
        } else {
            self.autopilot_modes
                .iter()
                .map(AutopilotMode::short_code)
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!(
            "gear {} flaps {} spoilers {:.0}% autopilot {} airspeed {:.0} kt AoA {:.1} deg altitude {:.0} ft AGL",
            self.gear,
            self.flap_index,
            self.spoiler_position * 100.0,
            modes,
            self.airspeed_kt,
            self.angle_of_attack_deg,
            self.altitude_agl_ft,
        )
    }
}
