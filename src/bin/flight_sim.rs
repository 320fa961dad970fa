//! Synthetic flight telemetry generator
//!
//! Emits JSON-lines `FlightState` samples for a takeoff, cruise or approach
//! profile, with optional injected events that should trip the advisor's
//! trigger classes.
//!
//! # Usage
//! ```bash
//! flight-sim --profile approach --inject gear-up --speed 10 | flight-advisor run
//! ```

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use flight_advisor::types::{AutopilotMode, FlightState, GearPosition};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Profile {
    Takeoff,
    Cruise,
    Approach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Event {
    /// Gear left up through 500 ft on approach
    GearUp,
    /// Airspeed excursion above the limit
    Overspeed,
    /// Angle of attack rising toward the stall
    Stall,
    /// Autopilot drops out
    ApDisconnect,
    /// Speed above the flap placard
    FlapOverspeed,
}

#[derive(Parser, Debug)]
#[command(name = "flight-sim")]
#[command(about = "Synthetic flight telemetry for flight-advisor testing")]
#[command(version)]
struct Args {
    #[arg(short, long, value_enum, default_value = "approach")]
    profile: Profile,

    /// Events to inject mid-profile (repeatable)
    #[arg(short, long, value_enum)]
    inject: Vec<Event>,

    /// Profile duration in seconds of flight time
    #[arg(short, long, default_value = "180", value_parser = clap::value_parser!(u32).range(10..=7200))]
    duration: u32,

    /// Samples per second
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..=50))]
    rate: u32,

    /// Time compression (1 = real time, 0 = no delay)
    #[arg(short, long, default_value = "0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress the event log on stderr
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Simulator
// ============================================================================

/// Fraction of the profile at which injected events start and stop
const EVENT_WINDOW: (f64, f64) = (0.55, 0.7);

struct Simulator {
    profile: Profile,
    events: Vec<Event>,
    duration_s: f64,
    rng: StdRng,
    airspeed_noise: Normal<f64>,
    aoa_noise: Normal<f64>,
    altitude_noise: Normal<f64>,
    start: DateTime<Utc>,
}

impl Simulator {
    fn new(args: &Args) -> Result<Self> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            profile: args.profile,
            events: args.inject.clone(),
            duration_s: f64::from(args.duration),
            rng,
            airspeed_noise: Normal::new(0.0, 1.5)?,
            aoa_noise: Normal::new(0.0, 0.3)?,
            altitude_noise: Normal::new(0.0, 4.0)?,
            start: Utc::now(),
        })
    }

    fn injected(&self, event: Event, progress: f64) -> bool {
        self.events.contains(&event) && progress >= EVENT_WINDOW.0 && progress <= EVENT_WINDOW.1
    }

    /// Nominal (airspeed, altitude, flaps, gear, aoa) for the profile
    fn nominal(&self, progress: f64) -> (f64, f64, u8, GearPosition, f64) {
        match self.profile {
            Profile::Takeoff => {
                let altitude = (progress * 3_000.0 - 300.0).max(0.0);
                let airspeed = 140.0 + progress * 110.0;
                let gear = if altitude > 150.0 { GearPosition::Up } else { GearPosition::Down };
                let flaps = if airspeed < 200.0 { 1 } else { 0 };
                (airspeed, altitude, flaps, gear, 8.0 - progress * 4.0)
            }
            Profile::Cruise => (280.0, 35_000.0, 0, GearPosition::Up, 2.5),
            Profile::Approach => {
                let altitude = 3_000.0 * (1.0 - progress);
                let airspeed = 250.0 - progress * 110.0;
                let flaps = match altitude {
                    a if a > 2_500.0 => 0,
                    a if a > 2_000.0 => 1,
                    a if a > 1_500.0 => 2,
                    a if a > 1_000.0 => 3,
                    _ => 4,
                };
                let gear = if altitude < 1_800.0 { GearPosition::Down } else { GearPosition::Up };
                (airspeed, altitude, flaps, gear, 5.0)
            }
        }
    }

    fn sample(&mut self, t_s: f64) -> FlightState {
        let progress = (t_s / self.duration_s).clamp(0.0, 1.0);
        let (mut airspeed, mut altitude, flaps, mut gear, mut aoa) = self.nominal(progress);

        airspeed += self.airspeed_noise.sample(&mut self.rng);
        aoa += self.aoa_noise.sample(&mut self.rng);
        altitude = (altitude + self.altitude_noise.sample(&mut self.rng)).max(0.0);

        if self.injected(Event::GearUp, progress) {
            gear = GearPosition::Up;
            altitude = altitude.min(450.0);
        }
        if self.injected(Event::Overspeed, progress) {
            airspeed = 355.0 + self.airspeed_noise.sample(&mut self.rng);
        }
        if self.injected(Event::Stall, progress) {
            aoa = 16.0 + self.aoa_noise.sample(&mut self.rng);
        }
        if self.injected(Event::FlapOverspeed, progress) {
            airspeed = airspeed.max(240.0);
        }

        let mut modes = BTreeSet::new();
        let autopilot_on = match self.profile {
            Profile::Takeoff => progress > 0.4,
            Profile::Cruise => true,
            Profile::Approach => altitude > 200.0,
        } && !self.injected(Event::ApDisconnect, progress);
        if autopilot_on {
            modes.insert(AutopilotMode::Engaged);
            modes.insert(AutopilotMode::Autothrottle);
            modes.insert(match self.profile {
                Profile::Approach => AutopilotMode::Approach,
                Profile::Cruise => AutopilotMode::AltitudeHold,
                Profile::Takeoff => AutopilotMode::VerticalSpeed,
            });
        }

        let timestamp = self.start + TimeDelta::milliseconds((t_s * 1_000.0) as i64);
        FlightState {
            timestamp,
            gear,
            flap_index: flaps,
            spoiler_position: 0.0,
            autopilot_modes: modes,
            airspeed_kt: airspeed.max(0.0),
            angle_of_attack_deg: aoa.clamp(-20.0, 30.0),
            altitude_agl_ft: altitude,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut sim = Simulator::new(&args)?;

    let total = args.duration * args.rate;
    let step_s = 1.0 / f64::from(args.rate);
    let pace = (args.speed > 0.0).then(|| Duration::from_secs_f64(step_s / args.speed));

    if !args.quiet {
        eprintln!(
            "[flight-sim] profile={:?} events={:?} samples={} rate={}Hz",
            args.profile, args.inject, total, args.rate
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut previous_gear = None;
    for i in 0..total {
        let state = sim.sample(f64::from(i) * step_s);
        if !args.quiet && previous_gear != Some(state.gear) {
            eprintln!("[flight-sim] t={:.1}s {}", f64::from(i) * step_s, state.summary());
            previous_gear = Some(state.gear);
        }
        serde_json::to_writer(&mut out, &state)?;
        out.write_all(b"\n")?;
        if let Some(delay) = pace {
            out.flush()?;
            tokio::time::sleep(delay).await;
        }
    }
    out.flush()?;
    Ok(())
}
