//! FlightState -> retrieval query text

use crate::types::{FlightState, GearPosition, Trigger};

/// Coarse phase of flight inferred from the snapshot, used as query context
pub fn flight_phase(state: &FlightState) -> &'static str {
    if state.altitude_agl_ft < 10.0 && state.airspeed_kt < 40.0 {
        "on ground"
    } else if state.altitude_agl_ft < 2_500.0 && (state.flap_index > 0 || state.gear != GearPosition::Up) {
        "approach or departure, low altitude near terrain"
    } else if state.altitude_agl_ft < 10_000.0 {
        "climb or descent"
    } else {
        "cruise"
    }
}

/// Query text for a bare snapshot
pub fn state_query(state: &FlightState) -> String {
    format!("{}. Phase: {}.", state.summary(), flight_phase(state))
}

/// Query text for a trigger: the class description leads so it dominates
/// the embedding.
pub fn trigger_query(trigger: &Trigger) -> String {
    format!("{}. {}", trigger.description, state_query(&trigger.state))
}
