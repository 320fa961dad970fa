//! State Change Detector
//!
//! Consumes the flight-state stream and emits a `Trigger` only when a
//! trigger class's condition crosses into a state worth advising on.
//!
//! Trigger classes live in a fixed registry (one `ClassMachine` each) and are
//! evaluated by simple iteration per incoming snapshot. Machines share nothing
//! but the stream position (the previous snapshot).

mod condition;
mod machine;

pub use condition::{Condition, FlapPlacard};
pub use machine::{ClassMachine, DetectorPhase, StepOutcome, TriggerClass};

use tracing::{debug, info};

use crate::error::AdvisorError;
use crate::types::{FlightState, Trigger, TriggerClassId};

/// Condition activity for one class on one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionReport {
    pub class: TriggerClassId,
    pub active: bool,
}

/// Everything the detector learned from one snapshot
#[derive(Debug, Default)]
pub struct Observation {
    pub triggers: Vec<Trigger>,
    /// One entry per registered class, in registry order
    pub conditions: Vec<ConditionReport>,
}

/// Registry of trigger classes plus the last accepted snapshot
pub struct StateChangeDetector {
    machines: Vec<ClassMachine>,
    previous: Option<FlightState>,
}

impl StateChangeDetector {
    pub fn new(classes: Vec<TriggerClass>) -> Self {
        info!(
            classes = classes.len(),
            "[Detector] Registered trigger classes: {}",
            classes
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            machines: classes.into_iter().map(ClassMachine::new).collect(),
            previous: None,
        }
    }

    /// Feed one snapshot through every registered class.
    ///
    /// Malformed or out-of-order snapshots are rejected with `InvalidInput`
    /// and leave every machine untouched.
    pub fn observe(&mut self, state: &FlightState) -> Result<Observation, AdvisorError> {
        state.validate()?;
        if let Some(prev) = &self.previous {
            if state.timestamp < prev.timestamp {
                return Err(AdvisorError::InvalidInput(format!(
                    "timestamp {} precedes previous sample {}",
                    state.timestamp, prev.timestamp
                )));
            }
        }

        let previous = self.previous.as_ref();
        let mut observation = Observation {
            triggers: Vec::new(),
            conditions: Vec::with_capacity(self.machines.len()),
        };
        for machine in &mut self.machines {
            let outcome = machine.step(previous, state);
            if let Some(trigger) = outcome.trigger {
                debug!(
                    class = %trigger.class,
                    sequence = trigger.sequence,
                    "[Detector] Trigger fired"
                );
                observation.triggers.push(trigger);
            }
            observation.conditions.push(ConditionReport {
                class: machine.class().id.clone(),
                active: outcome.active,
            });
        }

        self.previous = Some(state.clone());
        Ok(observation)
    }

    /// Current phase of every class, in registry order
    pub fn phases(&self) -> Vec<(TriggerClassId, DetectorPhase)> {
        self.machines
            .iter()
            .map(|m| (m.class().id.clone(), m.phase()))
            .collect()
    }

    pub fn class_count(&self) -> usize {
        self.machines.len()
    }
}
