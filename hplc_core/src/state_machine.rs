//! The "RUN" State Machine - instrument phase and transition rules
//!
//! ```text
//!            start_pump          equilibrated          inject
//!   IDLE ───────────────► PUMPING ───────────► READY ─────────► INJECTED
//!                            │  ▲                │                  │ first peak - lead
//!          adjust_conditions ▼  │ equilibrated   │                  ▼
//!                       EQUILIBRATING ◄──────────┘               RUNNING
//!                                                                   │ t >= injection + max_time
//!                                                                   ▼
//!   STOPPED ◄── stop_pump (any)      ERROR ◄── over-pressure     COMPLETED
//! ```
//!
//! All automatic transitions are driven by simulation time only, never by
//! wall-clock jitter, so a run is reproducible from its inputs.

use crate::chemistry::{PressureReading, ScheduledPeak};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Tolerance for comparing accumulated simulation time against thresholds.
const TIME_EPSILON: f64 = 1e-9;

/// Instrument run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Pump off; the only phase in which the method may be edited
    #[default]
    Idle,
    /// Pump started, initial equilibration running
    Pumping,
    /// Re-equilibrating after a change of conditions
    Equilibrating,
    /// Equilibrated; waiting for injection
    Ready,
    /// Sample on column, nothing eluted yet
    Injected,
    /// Peaks eluting
    Running,
    /// Run duration reached
    Completed,
    /// Pump stopped by the user
    Stopped,
    /// Over-pressure fault
    Error,
}

impl RunPhase {
    /// Returns the phase name.
    pub fn name(&self) -> &'static str {
        match self {
            RunPhase::Idle => "IDLE",
            RunPhase::Pumping => "PUMPING",
            RunPhase::Equilibrating => "EQUILIBRATING",
            RunPhase::Ready => "READY",
            RunPhase::Injected => "INJECTED",
            RunPhase::Running => "RUNNING",
            RunPhase::Completed => "COMPLETED",
            RunPhase::Stopped => "STOPPED",
            RunPhase::Error => "ERROR",
        }
    }

    /// Returns the front-panel status line for this phase.
    pub fn status_text(&self) -> &'static str {
        match self {
            RunPhase::Idle => "IDLE",
            RunPhase::Pumping => "PUMPING",
            RunPhase::Equilibrating => "EQUILIBRATING",
            RunPhase::Ready => "READY FOR INJECTION",
            RunPhase::Injected => "SAMPLE INJECTED",
            RunPhase::Running => "RUNNING",
            RunPhase::Completed => "RUN COMPLETED",
            RunPhase::Stopped => "STOPPED BY USER",
            RunPhase::Error => "PRESSURE ERROR",
        }
    }

    /// Returns true if the run clock advances in this phase.
    pub fn is_ticking(&self) -> bool {
        matches!(
            self,
            RunPhase::Pumping
                | RunPhase::Equilibrating
                | RunPhase::Ready
                | RunPhase::Injected
                | RunPhase::Running
        )
    }

    /// Returns true if the phase ends the clock until the user acts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Stopped | RunPhase::Error)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a phase change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    PumpStarted,
    Equilibrated,
    ConditionsChanged,
    SampleInjected,
    ElutionStarted,
    RunDurationReached,
    StoppedByUser,
    OverPressure,
    Reset,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TransitionReason::PumpStarted => "pump started",
            TransitionReason::Equilibrated => "column equilibrated",
            TransitionReason::ConditionsChanged => "conditions changed, re-equilibrating",
            TransitionReason::SampleInjected => "sample injected",
            TransitionReason::ElutionStarted => "first compound eluting",
            TransitionReason::RunDurationReached => "run duration reached",
            TransitionReason::StoppedByUser => "stopped by user",
            TransitionReason::OverPressure => "pressure above limit",
            TransitionReason::Reset => "instrument reset",
        };
        write!(f, "{}", text)
    }
}

/// A single phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: RunPhase,
    pub to: RunPhase,
    pub reason: TransitionReason,
    /// Simulation time of the transition (min)
    pub at: f64,
}

/// Equilibration length, or the remaining countdown while equilibrating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum EquilibrationTime {
    /// Number of clock ticks
    Ticks(u32),
    /// Simulated minutes
    Minutes(f64),
}

impl Default for EquilibrationTime {
    fn default() -> Self {
        EquilibrationTime::Ticks(5)
    }
}

impl EquilibrationTime {
    /// Counts down by one tick of `dt` minutes.
    pub fn countdown(self, dt: f64) -> Self {
        match self {
            EquilibrationTime::Ticks(n) => EquilibrationTime::Ticks(n.saturating_sub(1)),
            EquilibrationTime::Minutes(m) => EquilibrationTime::Minutes(m - dt),
        }
    }

    pub fn is_elapsed(&self) -> bool {
        match self {
            EquilibrationTime::Ticks(n) => *n == 0,
            EquilibrationTime::Minutes(m) => *m <= TIME_EPSILON,
        }
    }
}

/// Timing rules of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Equilibration after pump start or a change of conditions
    pub equilibration: EquilibrationTime,

    /// INJECTED becomes RUNNING this long before the first apex (min)
    pub injection_lead: f64,

    /// Run duration after the injection: RUNNING becomes COMPLETED this
    /// long after the sample went in (min)
    pub max_time: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            equilibration: EquilibrationTime::default(),
            injection_lead: 0.05,
            max_time: 10.0,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if let EquilibrationTime::Minutes(m) = self.equilibration {
            if !m.is_finite() || m < 0.0 {
                return Err(EngineError::invalid_parameter("equilibration", "must be >= 0 min"));
            }
        }
        if !self.injection_lead.is_finite() || self.injection_lead < 0.0 {
            return Err(EngineError::invalid_parameter("injection_lead", "must be >= 0"));
        }
        if !self.max_time.is_finite() || self.max_time <= 0.0 {
            return Err(EngineError::invalid_parameter("max_time", "must be > 0"));
        }
        Ok(())
    }
}

/// Canonical run state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunState {
    pub phase: RunPhase,

    /// Minutes since pump start
    pub simulation_time: f64,

    /// Last applied back-pressure (bar)
    pub pressure: f64,

    pub pressure_warning: bool,

    /// Peaks of the current injection
    pub scheduled_peaks: Vec<ScheduledPeak>,

    /// Simulation time of the current injection
    pub injected_at: Option<f64>,

    /// Remaining equilibration, if equilibrating
    pub equilibration_remaining: Option<EquilibrationTime>,
}

/// Owns the run state and applies the transition rules.
#[derive(Debug, Clone)]
pub struct InstrumentStateMachine {
    config: RunConfig,
    state: RunState,
}

impl InstrumentStateMachine {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            state: RunState::default(),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    /// Rejects `operation` unless the current phase is one of `allowed`.
    pub fn ensure_phase(&self, operation: &'static str, allowed: &[RunPhase]) -> Result<()> {
        if allowed.contains(&self.state.phase) {
            Ok(())
        } else {
            Err(EngineError::invalid_state(operation, self.state.phase))
        }
    }

    fn transition(&mut self, to: RunPhase, reason: TransitionReason) -> PhaseChange {
        let change = PhaseChange {
            from: self.state.phase,
            to,
            reason,
            at: self.state.simulation_time,
        };
        info!(
            "{} -> {} ({}) at t={:.2} min",
            change.from, change.to, reason, change.at
        );
        self.state.phase = to;
        change
    }

    /// Starts the pump from any pump-off phase.
    ///
    /// Resets the run state and arms equilibration. If `pressure` is already
    /// over the limit the machine goes straight to ERROR.
    pub fn start_pump(&mut self, pressure: PressureReading) -> Result<Vec<PhaseChange>> {
        if self.state.phase.is_ticking() {
            return Err(EngineError::invalid_state("start pump", self.state.phase));
        }

        self.state = RunState {
            phase: self.state.phase,
            pressure: pressure.bar,
            pressure_warning: pressure.warning,
            ..Default::default()
        };

        if pressure.warning {
            warn!("Refusing to pump: {:.0} bar exceeds {:.0} bar", pressure.bar, pressure.max);
            if self.state.phase == RunPhase::Error {
                return Ok(Vec::new());
            }
            return Ok(vec![self.transition(RunPhase::Error, TransitionReason::OverPressure)]);
        }

        self.state.equilibration_remaining = Some(self.config.equilibration);
        Ok(vec![self.transition(RunPhase::Pumping, TransitionReason::PumpStarted)])
    }

    /// Stops the pump from any phase. Idempotent: a second call changes nothing.
    pub fn stop_pump(&mut self) -> Option<PhaseChange> {
        if self.state.phase == RunPhase::Stopped {
            return None;
        }
        let change = self.transition(RunPhase::Stopped, TransitionReason::StoppedByUser);
        self.state = RunState {
            phase: RunPhase::Stopped,
            ..Default::default()
        };
        Some(change)
    }

    /// Returns a stopped or completed instrument to IDLE.
    pub fn reset(&mut self) -> Result<Option<PhaseChange>> {
        match self.state.phase {
            RunPhase::Idle => Ok(None),
            RunPhase::Stopped | RunPhase::Completed => {
                let change = self.transition(RunPhase::Idle, TransitionReason::Reset);
                self.state = RunState::default();
                Ok(Some(change))
            }
            phase => Err(EngineError::invalid_state("reset", phase)),
        }
    }

    /// Records an injection. Only legal in READY.
    pub fn inject(&mut self, peaks: Vec<ScheduledPeak>) -> Result<PhaseChange> {
        self.ensure_phase("inject", &[RunPhase::Ready])?;
        self.state.scheduled_peaks = peaks;
        self.state.injected_at = Some(self.state.simulation_time);
        Ok(self.transition(RunPhase::Injected, TransitionReason::SampleInjected))
    }

    /// Restarts equilibration after a change of conditions while pumping.
    pub fn begin_reequilibration(&mut self) -> Result<Option<PhaseChange>> {
        self.ensure_phase(
            "adjust conditions",
            &[RunPhase::Pumping, RunPhase::Equilibrating, RunPhase::Ready],
        )?;
        self.state.equilibration_remaining = Some(self.config.equilibration);
        if self.state.phase == RunPhase::Equilibrating {
            return Ok(None);
        }
        Ok(Some(self.transition(
            RunPhase::Equilibrating,
            TransitionReason::ConditionsChanged,
        )))
    }

    /// Pressure watchdog: records the reading and faults on over-pressure.
    pub fn apply_pressure(&mut self, reading: PressureReading) -> Option<PhaseChange> {
        self.state.pressure = reading.bar;
        self.state.pressure_warning = reading.warning;

        if reading.warning && self.state.phase != RunPhase::Error {
            warn!("Over-pressure: {:.0} bar > {:.0} bar", reading.bar, reading.max);
            self.state.equilibration_remaining = None;
            return Some(self.transition(RunPhase::Error, TransitionReason::OverPressure));
        }
        None
    }

    /// Advances simulation time by one step.
    pub fn advance_time(&mut self, dt: f64) {
        self.state.simulation_time += dt;
    }

    /// Simulation time at which INJECTED becomes RUNNING.
    ///
    /// With no peaks scheduled this is the current time.
    pub fn elution_trigger_time(&self) -> f64 {
        let first = self
            .state
            .scheduled_peaks
            .iter()
            .map(|p| p.elution_time)
            .fold(f64::INFINITY, f64::min);
        if first.is_finite() {
            first - self.config.injection_lead
        } else {
            self.state.simulation_time
        }
    }

    /// Simulation time at which the current run completes.
    ///
    /// `None` until a sample is injected: a pumping instrument holds READY
    /// until injected or stopped.
    pub fn run_end_time(&self) -> Option<f64> {
        self.state.injected_at.map(|t0| t0 + self.config.max_time)
    }

    /// Applies the automatic (time-driven) transitions for a tick of `dt`.
    pub fn evaluate(&mut self, dt: f64) -> Vec<PhaseChange> {
        let mut changes = Vec::new();
        let t = self.state.simulation_time;

        if matches!(self.state.phase, RunPhase::Pumping | RunPhase::Equilibrating) {
            if let Some(remaining) = self.state.equilibration_remaining {
                let remaining = remaining.countdown(dt);
                if remaining.is_elapsed() {
                    self.state.equilibration_remaining = None;
                    changes.push(self.transition(RunPhase::Ready, TransitionReason::Equilibrated));
                } else {
                    self.state.equilibration_remaining = Some(remaining);
                }
            }
        }

        let run_over = self
            .run_end_time()
            .is_some_and(|end| t + TIME_EPSILON >= end);
        if self.state.phase == RunPhase::Injected
            && (t + TIME_EPSILON >= self.elution_trigger_time() || run_over)
        {
            changes.push(self.transition(RunPhase::Running, TransitionReason::ElutionStarted));
        }

        if self.state.phase == RunPhase::Running && run_over {
            changes.push(self.transition(RunPhase::Completed, TransitionReason::RunDurationReached));
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::Compound;
    use approx::assert_relative_eq;

    const DT: f64 = 0.05;

    fn ok_pressure() -> PressureReading {
        PressureReading { bar: 200.0, max: 400.0, warning: false }
    }

    fn high_pressure() -> PressureReading {
        PressureReading { bar: 450.0, max: 400.0, warning: true }
    }

    fn tick(machine: &mut InstrumentStateMachine) -> Vec<PhaseChange> {
        machine.advance_time(DT);
        machine.evaluate(DT)
    }

    fn ready_machine() -> InstrumentStateMachine {
        let mut machine = InstrumentStateMachine::new(RunConfig::default());
        machine.start_pump(ok_pressure()).unwrap();
        for _ in 0..5 {
            tick(&mut machine);
        }
        assert_eq!(machine.phase(), RunPhase::Ready);
        machine
    }

    fn peak_at(time: f64) -> ScheduledPeak {
        ScheduledPeak {
            compound: Compound::new("Caffeine", 0.55, 1.0),
            elution_time: time,
            width: 0.15,
            amplitude: 1.0,
        }
    }

    #[test]
    fn test_equilibration_reaches_ready_exactly_once() {
        let mut machine = InstrumentStateMachine::new(RunConfig::default());
        let changes = machine.start_pump(ok_pressure()).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, RunPhase::Pumping);

        let mut ready_count = 0;
        for i in 1..=20 {
            for change in tick(&mut machine) {
                if change.to == RunPhase::Ready {
                    ready_count += 1;
                    assert_eq!(i, 5, "READY should arrive on the fifth tick");
                }
            }
        }
        assert_eq!(ready_count, 1);
    }

    #[test]
    fn test_minutes_equilibration() {
        let config = RunConfig {
            equilibration: EquilibrationTime::Minutes(0.2),
            ..Default::default()
        };
        let mut machine = InstrumentStateMachine::new(config);
        machine.start_pump(ok_pressure()).unwrap();
        for _ in 0..3 {
            assert!(tick(&mut machine).is_empty());
        }
        let changes = tick(&mut machine);
        assert_eq!(changes[0].to, RunPhase::Ready);
    }

    #[test]
    fn test_start_pump_rejected_while_pumping() {
        let mut machine = ready_machine();
        let err = machine.start_pump(ok_pressure()).unwrap_err();
        assert_eq!(err, EngineError::invalid_state("start pump", RunPhase::Ready));
    }

    #[test]
    fn test_start_pump_over_pressure_goes_to_error() {
        let mut machine = InstrumentStateMachine::new(RunConfig::default());
        let changes = machine.start_pump(high_pressure()).unwrap();
        assert_eq!(changes[0].to, RunPhase::Error);
        assert!(machine.state().pressure_warning);
        assert!(machine.state().equilibration_remaining.is_none());
    }

    #[test]
    fn test_inject_only_when_ready() {
        let mut machine = InstrumentStateMachine::new(RunConfig::default());
        machine.start_pump(ok_pressure()).unwrap();
        let err = machine.inject(vec![peak_at(2.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { operation: "inject", .. }));
        assert!(machine.state().scheduled_peaks.is_empty());
        assert_eq!(machine.phase(), RunPhase::Pumping);
    }

    #[test]
    fn test_injected_to_running_to_completed() {
        let mut machine = ready_machine();
        let t0 = machine.state().simulation_time;
        machine.inject(vec![peak_at(t0 + 1.0)]).unwrap();

        let mut running_at = None;
        let mut completed_at = None;
        while completed_at.is_none() {
            for change in tick(&mut machine) {
                match change.to {
                    RunPhase::Running => running_at = Some(change.at),
                    RunPhase::Completed => completed_at = Some(change.at),
                    _ => {}
                }
            }
        }

        let running_at = running_at.unwrap();
        assert!(running_at + TIME_EPSILON >= t0 + 1.0 - 0.05);
        assert!(running_at < t0 + 1.0);
        assert!((completed_at.unwrap() - (t0 + 10.0)).abs() < 1e-6);
    }

    #[test]
    fn test_late_injection_gets_full_run() {
        let mut machine = ready_machine();
        while machine.state().simulation_time < 9.6 {
            assert!(tick(&mut machine).is_empty());
        }
        assert_eq!(machine.phase(), RunPhase::Ready);
        assert_eq!(machine.run_end_time(), None);

        let t0 = machine.state().simulation_time;
        machine.inject(vec![peak_at(t0 + 0.95)]).unwrap();
        assert_relative_eq!(machine.run_end_time().unwrap(), t0 + 10.0);

        let mut phases = Vec::new();
        while machine.phase() != RunPhase::Completed {
            phases.extend(tick(&mut machine).into_iter().map(|c| (c.to, c.at)));
        }
        let (_, running_at) = phases[0];
        assert_eq!(phases[0].0, RunPhase::Running);
        assert!(running_at < t0 + 0.95);
        assert!(machine.state().simulation_time > t0 + 9.9);
    }

    #[test]
    fn test_run_duration_reached_before_elution() {
        let config = RunConfig { max_time: 1.0, ..Default::default() };
        let mut machine = InstrumentStateMachine::new(config);
        machine.start_pump(ok_pressure()).unwrap();
        for _ in 0..5 {
            tick(&mut machine);
        }
        machine.inject(vec![peak_at(50.0)]).unwrap();
        let mut last = Vec::new();
        for _ in 0..20 {
            let changes = tick(&mut machine);
            if !changes.is_empty() {
                last = changes;
                break;
            }
        }
        let phases: Vec<RunPhase> = last.iter().map(|c| c.to).collect();
        assert_eq!(phases, vec![RunPhase::Running, RunPhase::Completed]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut machine = ready_machine();
        assert!(machine.stop_pump().is_some());
        assert_eq!(machine.phase(), RunPhase::Stopped);
        assert!(machine.stop_pump().is_none());
        assert_eq!(machine.phase(), RunPhase::Stopped);
        assert_eq!(machine.state().simulation_time, 0.0);
    }

    #[test]
    fn test_reequilibration_withdraws_ready() {
        let mut machine = ready_machine();
        let change = machine.begin_reequilibration().unwrap().unwrap();
        assert_eq!(change.to, RunPhase::Equilibrating);

        // A second change only restarts the countdown
        tick(&mut machine);
        assert!(machine.begin_reequilibration().unwrap().is_none());
        for _ in 0..4 {
            assert!(tick(&mut machine).is_empty());
        }
        assert_eq!(tick(&mut machine)[0].to, RunPhase::Ready);
    }

    #[test]
    fn test_watchdog_faults_from_any_phase() {
        let mut machine = InstrumentStateMachine::new(RunConfig::default());
        let change = machine.apply_pressure(high_pressure()).unwrap();
        assert_eq!(change.from, RunPhase::Idle);
        assert_eq!(change.to, RunPhase::Error);

        // Already faulted: no duplicate transition
        assert!(machine.apply_pressure(high_pressure()).is_none());
    }

    #[test]
    fn test_reset_paths() {
        let mut machine = ready_machine();
        assert!(machine.reset().is_err());
        machine.stop_pump();
        let change = machine.reset().unwrap().unwrap();
        assert_eq!(change.to, RunPhase::Idle);
        assert!(machine.reset().unwrap().is_none());
    }
}
