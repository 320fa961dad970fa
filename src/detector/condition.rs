//! Trigger-class conditions
//!
//! Each trigger class carries one tagged `Condition` variant. Thresholds are
//! policy parameters supplied by configuration; the values in
//! `config::defaults` are examples, not certified limits.

use serde::{Deserialize, Serialize};

use crate::types::{AutopilotMode, FlightState, GearPosition};

/// Maximum airspeed for one flap detent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlapPlacard {
    pub flap_index: u8,
    pub max_airspeed_kt: f64,
}

/// Detection predicate for a trigger class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Gear up while below a radio altitude
    GearUpBelow { max_altitude_ft: f64 },
    /// Indicated airspeed above a limit
    Overspeed { max_airspeed_kt: f64 },
    /// Angle of attack above a limit (stall margin)
    HighAngleOfAttack { max_aoa_deg: f64 },
    /// Airspeed above the placard for the current flap detent
    FlapOverspeed { placards: Vec<FlapPlacard> },
    /// Spoilers deployed inside an altitude band (approach, not rollout)
    SpoilersExtended {
        min_altitude_ft: f64,
        max_altitude_ft: f64,
        min_deployment: f64,
    },
    /// Autopilot engaged on the previous sample, disengaged on this one
    AutopilotDisconnect,
}

impl Condition {
    /// Evaluate against the current snapshot and the one before it.
    pub fn evaluate(&self, previous: Option<&FlightState>, current: &FlightState) -> bool {
        match self {
            Condition::GearUpBelow { max_altitude_ft } => {
                current.gear == GearPosition::Up && current.altitude_agl_ft < *max_altitude_ft
            }
            Condition::Overspeed { max_airspeed_kt } => current.airspeed_kt > *max_airspeed_kt,
            Condition::HighAngleOfAttack { max_aoa_deg } => {
                current.angle_of_attack_deg > *max_aoa_deg
            }
            Condition::FlapOverspeed { placards } => {
                placard_for(placards, current.flap_index)
                    .is_some_and(|limit| current.airspeed_kt > limit)
            }
            Condition::SpoilersExtended {
                min_altitude_ft,
                max_altitude_ft,
                min_deployment,
            } => {
                current.spoiler_position >= *min_deployment
                    && current.altitude_agl_ft >= *min_altitude_ft
                    && current.altitude_agl_ft <= *max_altitude_ft
            }
            Condition::AutopilotDisconnect => {
                previous.is_some_and(|prev| prev.has_mode(AutopilotMode::Engaged))
                    && !current.has_mode(AutopilotMode::Engaged)
            }
        }
    }

    /// Config-time sanity checks; returns a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut finite = |name: &str, value: f64| {
            if !value.is_finite() {
                problems.push(format!("{name} must be finite (got {value})"));
            }
        };
        match self {
            Condition::GearUpBelow { max_altitude_ft } => finite("max_altitude_ft", *max_altitude_ft),
            Condition::Overspeed { max_airspeed_kt } => finite("max_airspeed_kt", *max_airspeed_kt),
            Condition::HighAngleOfAttack { max_aoa_deg } => finite("max_aoa_deg", *max_aoa_deg),
            Condition::FlapOverspeed { placards } => {
                for p in placards {
                    finite("placards.max_airspeed_kt", p.max_airspeed_kt);
                }
            }
            Condition::SpoilersExtended {
                min_altitude_ft,
                max_altitude_ft,
                min_deployment,
            } => {
                finite("min_altitude_ft", *min_altitude_ft);
                finite("max_altitude_ft", *max_altitude_ft);
                finite("min_deployment", *min_deployment);
            }
            Condition::AutopilotDisconnect => {}
        }

        match self {
            Condition::FlapOverspeed { placards } if placards.is_empty() => {
                problems.push("flap_overspeed needs at least one placard".to_string());
            }
            Condition::SpoilersExtended {
                min_altitude_ft,
                max_altitude_ft,
                min_deployment,
            } => {
                if min_altitude_ft > max_altitude_ft {
                    problems.push(format!(
                        "min_altitude_ft ({min_altitude_ft:.0}) must be <= max_altitude_ft ({max_altitude_ft:.0})"
                    ));
                }
                if !(0.0..=1.0).contains(min_deployment) {
                    problems.push(format!(
                        "min_deployment must be within 0.0..=1.0 (got {min_deployment:.2})"
                    ));
                }
            }
            _ => {}
        }
        problems
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::GearUpBelow { .. } => "gear_up_below",
            Condition::Overspeed { .. } => "overspeed",
            Condition::HighAngleOfAttack { .. } => "high_angle_of_attack",
            Condition::FlapOverspeed { .. } => "flap_overspeed",
            Condition::SpoilersExtended { .. } => "spoilers_extended",
            Condition::AutopilotDisconnect => "autopilot_disconnect",
        }
    }
}

/// Placard for the deepest configured detent not beyond `flap_index`.
///
/// Clean wing (no placard at or below the detent) has no flap limit.
fn placard_for(placards: &[FlapPlacard], flap_index: u8) -> Option<f64> {
    placards
        .iter()
        .filter(|p| p.flap_index <= flap_index && p.flap_index > 0)
        .max_by_key(|p| p.flap_index)
        .map(|p| p.max_airspeed_kt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state(gear: GearPosition, altitude: f64, airspeed: f64) -> FlightState {
        FlightState {
            timestamp: Utc::now(),
            gear,
            flap_index: 0,
            spoiler_position: 0.0,
            autopilot_modes: Default::default(),
            airspeed_kt: airspeed,
            angle_of_attack_deg: 3.0,
            altitude_agl_ft: altitude,
        }
    }

    #[test]
    fn gear_up_below_altitude() {
        let cond = Condition::GearUpBelow { max_altitude_ft: 500.0 };
        assert!(cond.evaluate(None, &state(GearPosition::Up, 400.0, 150.0)));
        assert!(!cond.evaluate(None, &state(GearPosition::Down, 400.0, 150.0)));
        assert!(!cond.evaluate(None, &state(GearPosition::Up, 900.0, 150.0)));
    }

    #[test]
    fn flap_placard_uses_deepest_detent_at_or_below() {
        let cond = Condition::FlapOverspeed {
            placards: vec![
                FlapPlacard { flap_index: 1, max_airspeed_kt: 230.0 },
                FlapPlacard { flap_index: 5, max_airspeed_kt: 210.0 },
                FlapPlacard { flap_index: 30, max_airspeed_kt: 175.0 },
            ],
        };
        let mut s = state(GearPosition::Down, 2000.0, 215.0);
        s.flap_index = 10; // falls back to the flaps-5 placard
        assert!(cond.evaluate(None, &s));
        s.flap_index = 1;
        assert!(!cond.evaluate(None, &s));
        s.flap_index = 0;
        s.airspeed_kt = 300.0;
        assert!(!cond.evaluate(None, &s), "clean wing has no flap limit");
    }

    #[test]
    fn autopilot_disconnect_needs_previous_engaged() {
        let cond = Condition::AutopilotDisconnect;
        let mut engaged = state(GearPosition::Up, 10_000.0, 250.0);
        engaged.autopilot_modes.insert(AutopilotMode::Engaged);
        let manual = state(GearPosition::Up, 10_000.0, 250.0);

        assert!(!cond.evaluate(None, &manual));
        assert!(cond.evaluate(Some(&engaged), &manual));
        assert!(!cond.evaluate(Some(&manual), &manual));
        assert!(!cond.evaluate(Some(&engaged), &engaged));
    }

    #[test]
    fn spoilers_band_excludes_rollout() {
        let cond = Condition::SpoilersExtended {
            min_altitude_ft: 50.0,
            max_altitude_ft: 1000.0,
            min_deployment: 0.1,
        };
        let mut s = state(GearPosition::Down, 600.0, 140.0);
        s.spoiler_position = 0.5;
        assert!(cond.evaluate(None, &s));
        s.altitude_agl_ft = 0.0;
        assert!(!cond.evaluate(None, &s));
    }

    #[test]
    fn parses_tagged_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            condition: Condition,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
condition = { kind = "overspeed", max_airspeed_kt = 340.0 }
"#,
        )
        .unwrap();
        assert_eq!(parsed.condition, Condition::Overspeed { max_airspeed_kt: 340.0 });
    }

    #[test]
    fn validate_flags_bad_band() {
        let cond = Condition::SpoilersExtended {
            min_altitude_ft: 2000.0,
            max_altitude_ft: 1000.0,
            min_deployment: 1.5,
        };
        assert_eq!(cond.validate().len(), 2);
        assert!(Condition::FlapOverspeed { placards: vec![] }.validate().len() == 1);
    }
}
