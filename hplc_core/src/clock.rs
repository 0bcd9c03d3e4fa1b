//! The run clock: one fixed simulated step per tick.

use crate::error::{EngineError, Result};
use crate::signal::{DetectorRange, SamplePoint, SignalSynthesizer};
use crate::state_machine::{InstrumentStateMachine, PhaseChange};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Clock pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulated minutes per tick
    pub dt_minutes: f64,

    /// Wall-clock period between ticks (ms)
    pub tick_period_ms: u64,

    /// Run duration, counted from the injection (min)
    pub max_time_minutes: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            dt_minutes: 0.05,
            tick_period_ms: 100,
            max_time_minutes: 10.0,
        }
    }
}

impl ClockConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Simulated minutes per wall-clock second.
    pub fn time_scale(&self) -> f64 {
        if self.tick_period_ms == 0 {
            return f64::INFINITY;
        }
        self.dt_minutes * 1000.0 / self.tick_period_ms as f64
    }

    /// Ticks from injection to completion.
    pub fn ticks_per_run(&self) -> u64 {
        (self.max_time_minutes / self.dt_minutes).ceil() as u64
    }

    pub fn validate(&self) -> Result<()> {
        if !self.dt_minutes.is_finite() || self.dt_minutes <= 0.0 {
            return Err(EngineError::invalid_parameter("dt_minutes", "must be > 0"));
        }
        if !self.max_time_minutes.is_finite() || self.max_time_minutes <= 0.0 {
            return Err(EngineError::invalid_parameter("max_time_minutes", "must be > 0"));
        }
        Ok(())
    }
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub point: SamplePoint,
    pub changes: Vec<PhaseChange>,
}

/// Single authoritative tick source of an engine.
#[derive(Debug, Clone)]
pub struct RunClock {
    config: ClockConfig,
    active: bool,
    ticks: u64,
}

impl RunClock {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            active: false,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Starts the clock. No-op if already running.
    pub fn start(&mut self) {
        if !self.active {
            self.active = true;
            self.ticks = 0;
        }
    }

    pub fn halt(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Ticks since the clock was last started.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one tick against the machine and detector.
    ///
    /// Returns `None` without touching anything if the clock is halted. Halts
    /// itself once the machine leaves the ticking phases.
    pub fn tick(
        &mut self,
        machine: &mut InstrumentStateMachine,
        synth: &mut SignalSynthesizer,
        sensitivity: f64,
        range: DetectorRange,
    ) -> Option<TickReport> {
        if !self.active {
            return None;
        }
        if !machine.phase().is_ticking() {
            self.halt();
            return None;
        }

        let dt = self.config.dt_minutes;
        machine.advance_time(dt);
        self.ticks += 1;

        let time = machine.state().simulation_time;
        let value = synth.sample_at(time, &machine.state().scheduled_peaks, sensitivity, range);
        let changes = machine.evaluate(dt);

        debug!(tick = self.ticks, time, value, phase = %machine.phase(), "tick");

        if !machine.phase().is_ticking() {
            self.halt();
        }

        Some(TickReport {
            point: SamplePoint { time, value },
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::PressureReading;
    use crate::signal::SignalConfig;
    use crate::state_machine::{RunConfig, RunPhase};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn parts() -> (InstrumentStateMachine, SignalSynthesizer) {
        (
            InstrumentStateMachine::new(RunConfig::default()),
            SignalSynthesizer::new(SignalConfig::default(), ChaCha8Rng::seed_from_u64(7)),
        )
    }

    fn pump(machine: &mut InstrumentStateMachine) {
        machine
            .start_pump(PressureReading { bar: 200.0, max: 400.0, warning: false })
            .unwrap();
    }

    #[test]
    fn test_time_scale() {
        let config = ClockConfig::default();
        assert_eq!(config.tick_period(), Duration::from_millis(100));
        assert_relative_eq!(config.time_scale(), 0.5);
        assert_eq!(config.ticks_per_run(), 200);
    }

    #[test]
    fn test_halted_clock_does_nothing() {
        let (mut machine, mut synth) = parts();
        pump(&mut machine);
        let mut clock = RunClock::new(ClockConfig::default());
        assert!(clock
            .tick(&mut machine, &mut synth, 1.0, DetectorRange::default())
            .is_none());
        assert_eq!(machine.state().simulation_time, 0.0);
    }

    #[test]
    fn test_tick_advances_time() {
        let (mut machine, mut synth) = parts();
        pump(&mut machine);
        let mut clock = RunClock::new(ClockConfig::default());
        clock.start();

        let first = clock
            .tick(&mut machine, &mut synth, 1.0, DetectorRange::default())
            .unwrap();
        let second = clock
            .tick(&mut machine, &mut synth, 1.0, DetectorRange::default())
            .unwrap();
        assert_relative_eq!(first.point.time, 0.05);
        assert_relative_eq!(second.point.time, 0.10);
        assert_eq!(clock.ticks(), 2);
    }

    #[test]
    fn test_start_while_active_is_noop() {
        let (mut machine, mut synth) = parts();
        pump(&mut machine);
        let mut clock = RunClock::new(ClockConfig::default());
        clock.start();
        clock.tick(&mut machine, &mut synth, 1.0, DetectorRange::default());
        clock.start();
        assert_eq!(clock.ticks(), 1);
    }

    #[test]
    fn test_clock_halts_on_terminal_phase() {
        let (mut machine, mut synth) = parts();
        pump(&mut machine);
        let mut clock = RunClock::new(ClockConfig::default());
        clock.start();
        clock.tick(&mut machine, &mut synth, 1.0, DetectorRange::default());

        machine.stop_pump();
        assert_eq!(machine.phase(), RunPhase::Stopped);
        assert!(clock
            .tick(&mut machine, &mut synth, 1.0, DetectorRange::default())
            .is_none());
        assert!(!clock.is_active());
    }
}
