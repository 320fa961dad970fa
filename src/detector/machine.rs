//! Per-class detection state machine
//!
//! ```text
//!            true                held >= arm delay
//!   Idle ───────────> Armed ─────────────────────> Fired ──> Cooldown
//!    ^  <─────────────  │ false                                 │
//!    │                                                          │
//!    └──────── no true observation for >= cooldown ─────────────┘
//! ```
//!
//! The cooldown is measured from the last sample on which the condition was
//! observed true, so a sustained condition never re-fires, while a recurrence
//! after at least one cooldown of clear time does.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::Condition;
use crate::types::{FlightState, Trigger, TriggerClassId};

/// Detection phase of one trigger class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectorPhase {
    Idle,
    /// Condition true, waiting out the arming delay
    Armed { since: DateTime<Utc> },
    /// Trigger emitted on the most recent sample
    Fired,
    Cooldown,
}

/// Registry entry: class id + condition + timing
#[derive(Debug, Clone)]
pub struct TriggerClass {
    pub id: TriggerClassId,
    pub description: String,
    pub condition: Condition,
    /// Minimum clear time between fires
    pub cooldown: TimeDelta,
    /// How long the condition must hold before firing (zero = first sample)
    pub arm_delay: TimeDelta,
}

/// Result of feeding one sample to a class machine
#[derive(Debug)]
pub struct StepOutcome {
    /// Whether the condition is true on this sample
    pub active: bool,
    pub trigger: Option<Trigger>,
}

/// Independent state machine for one trigger class
#[derive(Debug)]
pub struct ClassMachine {
    class: TriggerClass,
    phase: DetectorPhase,
    last_true_at: Option<DateTime<Utc>>,
    fire_count: u64,
}

impl ClassMachine {
    pub fn new(class: TriggerClass) -> Self {
        Self {
            class,
            phase: DetectorPhase::Idle,
            last_true_at: None,
            fire_count: 0,
        }
    }

    pub fn class(&self) -> &TriggerClass {
        &self.class
    }

    pub fn phase(&self) -> DetectorPhase {
        self.phase
    }

    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }

    /// Advance the machine by one sample.
    pub fn step(&mut self, previous: Option<&FlightState>, current: &FlightState) -> StepOutcome {
        let now = current.timestamp;
        let active = self.class.condition.evaluate(previous, current);

        if self.phase == DetectorPhase::Fired {
            self.phase = DetectorPhase::Cooldown;
        }

        // Cooldown exit looks at the clear time before this sample counts.
        if self.phase == DetectorPhase::Cooldown {
            let cleared = self
                .last_true_at
                .map_or(true, |last| now - last >= self.class.cooldown);
            if cleared {
                self.phase = DetectorPhase::Idle;
            }
        }

        if active {
            self.last_true_at = Some(now);
        }

        match self.phase {
            DetectorPhase::Idle if active => {
                self.phase = DetectorPhase::Armed { since: now };
            }
            DetectorPhase::Armed { .. } if !active => {
                self.phase = DetectorPhase::Idle;
            }
            _ => {}
        }

        let mut trigger = None;
        if let DetectorPhase::Armed { since } = self.phase {
            if now - since >= self.class.arm_delay {
                self.fire_count += 1;
                self.phase = DetectorPhase::Fired;
                trigger = Some(Trigger {
                    class: self.class.id.clone(),
                    description: self.class.description.clone(),
                    state: current.clone(),
                    fired_at: now,
                    sequence: self.fire_count,
                });
            }
        }

        StepOutcome { active, trigger }
    }
}
