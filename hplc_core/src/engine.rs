//! The Engine - composition root of one simulated instrument
//!
//! Owns the method, the mobile phase, the column, the state machine, the run
//! clock and the detector. Every mutation happens in `&mut self` methods, so
//! API calls and ticks can never interleave.
//!
//! The engine never sleeps. Something external (an [`InstrumentRuntime`], a
//! test, a batch loop) calls [`Engine::tick`] at the configured period.
//!
//! [`InstrumentRuntime`]: crate::runtime::InstrumentRuntime

use crate::catalog::{self, DEFAULT_SAMPLE};
use crate::chemistry::{
    compute_pressure, estimate_retention_times, schedule_elutions_for_sample, ColumnProfile,
    MethodParameters, MethodPatch, MobilePhase, PressureReading, Sample,
};
use crate::clock::RunClock;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EngineListener, EventHub, SubscriptionId};
use crate::signal::{SamplePoint, SignalSynthesizer};
use crate::state_machine::{InstrumentStateMachine, PhaseChange, RunPhase, RunState};
use hplc_env::{InstrumentContext, InstrumentId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, warn};

/// RNG stream id of the detector noise.
pub const NOISE_STREAM: u64 = 1;

/// Read-only copy of the engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub id: InstrumentId,
    pub run: RunState,
    pub method: MethodParameters,
    pub max_pressure: f64,
    pub sample_id: String,
    pub chromatogram: Vec<SamplePoint>,
    pub clock_active: bool,
}

impl EngineSnapshot {
    pub fn phase(&self) -> RunPhase {
        self.run.phase
    }
}

/// One simulated HPLC instrument.
pub struct Engine {
    id: InstrumentId,
    config: EngineConfig,

    method: MethodParameters,
    max_pressure: f64,
    mobile_phase: MobilePhase,
    column: ColumnProfile,
    sample: Sample,

    machine: InstrumentStateMachine,
    clock: RunClock,
    synth: SignalSynthesizer,
    hub: EventHub,

    /// Points emitted since the last pump start
    chromatogram: Vec<SamplePoint>,
}

impl Engine {
    /// Creates an engine. A zero seed draws detector noise from entropy.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let (id, rng) = if config.seed == 0 {
            (InstrumentId::new(), ChaCha8Rng::from_entropy())
        } else {
            (
                InstrumentId::from_seed(config.seed),
                ChaCha8Rng::seed_from_u64(config.seed),
            )
        };
        Self::with_rng(config, id, rng)
    }

    /// Creates an engine whose id and noise come from an environment context.
    pub fn with_context<Ctx: InstrumentContext>(config: EngineConfig, ctx: &Ctx) -> Result<Self> {
        let id = match ctx.seed() {
            0 => InstrumentId::new(),
            seed => InstrumentId::from_seed(seed),
        };
        Self::with_rng(config, id, ctx.derive_rng(NOISE_STREAM))
    }

    /// Creates an engine with an explicit id and noise source.
    pub fn with_rng(config: EngineConfig, id: InstrumentId, rng: ChaCha8Rng) -> Result<Self> {
        config.validate()?;

        let method = MethodParameters::default();
        let engine = Self {
            id,
            max_pressure: config.chemistry.max_pressure,
            mobile_phase: MobilePhase::water_acetonitrile(method.organic_percent),
            column: ColumnProfile::from_method(&method),
            sample: catalog::sample(DEFAULT_SAMPLE)?,
            machine: InstrumentStateMachine::new(config.run_config()),
            clock: RunClock::new(config.clock.clone()),
            synth: SignalSynthesizer::new(config.signal.clone(), rng),
            hub: EventHub::new(),
            chromatogram: Vec::new(),
            method,
            config,
        };

        info!("[{}] Instrument created (seed {})", engine.id, engine.config.seed);
        Ok(engine)
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Edits the method. IDLE only; the patch is applied all-or-nothing.
    ///
    /// An accepted patch that over-pressures the column faults the instrument
    /// (ERROR) but is not itself an error.
    pub fn configure(&mut self, patch: &MethodPatch) -> Result<()> {
        self.machine.ensure_phase("configure", &[RunPhase::Idle])?;
        let (method, max_pressure) = patch.resolve(&self.method, self.max_pressure)?;
        self.apply_method(method, max_pressure);
        info!(
            "[{}] Method: {:.2} mL/min, {:.0} %B, {} {:.0} mm / {:.1} µm",
            self.id,
            self.method.flow_rate,
            self.method.organic_percent,
            self.method.column_type,
            self.method.column_length_mm,
            self.method.particle_size_um
        );
        self.check_pressure();
        Ok(())
    }

    /// Replaces the sample to inject. IDLE only.
    pub fn set_sample(&mut self, sample: Sample) -> Result<()> {
        self.machine.ensure_phase("set sample", &[RunPhase::Idle])?;
        info!("[{}] Sample: {} ({} compounds)", self.id, sample.id(), sample.len());
        self.sample = sample;
        Ok(())
    }

    /// Selects a catalog sample by id. IDLE only.
    pub fn select_sample(&mut self, sample_id: &str) -> Result<()> {
        self.machine.ensure_phase("set sample", &[RunPhase::Idle])?;
        let sample = catalog::sample(sample_id)?;
        self.set_sample(sample)
    }

    /// Starts the pump and the run clock.
    ///
    /// Fails with `OverPressure` (and leaves the instrument in ERROR) if the
    /// current method exceeds the pressure ceiling.
    pub fn start_pump(&mut self) -> Result<()> {
        let reading = self.current_pressure();
        let changes = self.machine.start_pump(reading)?;

        self.chromatogram.clear();
        self.hub.emit(&EngineEvent::PressureUpdated {
            bar: reading.bar,
            warning: reading.warning,
        });
        for change in changes {
            self.emit_change(change);
        }

        if reading.warning {
            self.clock.halt();
            return Err(EngineError::OverPressure {
                bar: reading.bar,
                max: reading.max,
            });
        }

        self.clock.start();
        Ok(())
    }

    /// Stops the pump from any phase. Idempotent.
    ///
    /// The clock is halted before this returns; later ticks emit nothing.
    pub fn stop_pump(&mut self) {
        self.clock.halt();
        if let Some(change) = self.machine.stop_pump() {
            self.emit_change(change);
            self.hub.emit(&EngineEvent::PressureUpdated {
                bar: 0.0,
                warning: false,
            });
        }
    }

    /// Injects the current sample. READY only.
    pub fn inject(&mut self) -> Result<()> {
        self.machine.ensure_phase("inject", &[RunPhase::Ready])?;

        let base = self.machine.state().simulation_time;
        let peaks = schedule_elutions_for_sample(
            &self.sample,
            &self.method,
            &self.mobile_phase,
            &self.column,
            base,
            &self.config.chemistry,
        )?;

        for peak in &peaks {
            info!(
                "[{}] {} scheduled at t={:.3} min (width {:.3}, height {:.3})",
                self.id, peak.compound.name, peak.elution_time, peak.width, peak.amplitude
            );
        }

        let change = self.machine.inject(peaks)?;
        self.emit_change(change);
        Ok(())
    }

    /// Returns a STOPPED or COMPLETED instrument to IDLE and clears the chromatogram.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(change) = self.machine.reset()? {
            self.clock.halt();
            self.chromatogram.clear();
            self.emit_change(change);
        }
        Ok(())
    }

    /// Changes conditions while pumping (PUMPING, EQUILIBRATING or READY).
    ///
    /// Column, mobile-phase or flow changes restart equilibration. Detector-only
    /// changes keep the phase. Over-pressure faults the instrument and is
    /// returned as an error.
    pub fn adjust_conditions(&mut self, patch: &MethodPatch) -> Result<()> {
        self.machine.ensure_phase(
            "adjust conditions",
            &[RunPhase::Pumping, RunPhase::Equilibrating, RunPhase::Ready],
        )?;
        let (method, max_pressure) = patch.resolve(&self.method, self.max_pressure)?;
        let reequilibrate = changes_conditions(&self.method, &method);
        self.apply_method(method, max_pressure);

        let reading = self.check_pressure();
        if reading.warning {
            return Err(EngineError::OverPressure {
                bar: reading.bar,
                max: reading.max,
            });
        }

        if reequilibrate {
            if let Some(change) = self.machine.begin_reequilibration()? {
                self.emit_change(change);
            }
        } else if self.machine.phase() == RunPhase::Ready {
            self.emit_estimated_retention();
        }
        Ok(())
    }

    /// Advances the run by one clock step.
    ///
    /// Returns `None` and emits nothing when the clock is halted.
    pub fn tick(&mut self) -> Option<SamplePoint> {
        let report = self.clock.tick(
            &mut self.machine,
            &mut self.synth,
            self.method.sensitivity,
            self.config.signal.detector_range,
        )?;

        self.chromatogram.push(report.point);
        self.hub.emit(&EngineEvent::Sample(report.point));
        for change in report.changes {
            self.emit_change(change);
        }
        Some(report.point)
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    pub fn subscribe<L: EngineListener + 'static>(&mut self, listener: L) -> SubscriptionId {
        self.subscribe_boxed(Box::new(listener))
    }

    pub fn subscribe_boxed(&mut self, listener: Box<dyn EngineListener>) -> SubscriptionId {
        self.hub.subscribe(listener)
    }

    /// Removes a listener. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.machine.phase()
    }

    pub fn state(&self) -> &RunState {
        self.machine.state()
    }

    /// Last pressure applied to the run state.
    pub fn pressure(&self) -> PressureReading {
        let state = self.machine.state();
        PressureReading {
            bar: state.pressure,
            max: self.max_pressure,
            warning: state.pressure_warning,
        }
    }

    pub fn max_pressure(&self) -> f64 {
        self.max_pressure
    }

    pub fn method(&self) -> &MethodParameters {
        &self.method
    }

    pub fn mobile_phase(&self) -> &MobilePhase {
        &self.mobile_phase
    }

    pub fn column(&self) -> &ColumnProfile {
        &self.column
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn chromatogram(&self) -> &[SamplePoint] {
        &self.chromatogram
    }

    /// Returns true while the run clock is active.
    pub fn is_ticking(&self) -> bool {
        self.clock.is_active()
    }

    /// Retention time of each compound of the current sample, in sample order.
    pub fn estimated_retention_times(&self) -> Result<Vec<f64>> {
        estimate_retention_times(
            &self.sample,
            &self.method,
            &self.mobile_phase,
            &self.column,
            &self.config.chemistry,
        )
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            id: self.id,
            run: self.machine.state().clone(),
            method: self.method.clone(),
            max_pressure: self.max_pressure,
            sample_id: self.sample.id().to_string(),
            chromatogram: self.chromatogram.clone(),
            clock_active: self.clock.is_active(),
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn apply_method(&mut self, method: MethodParameters, max_pressure: f64) {
        self.mobile_phase.set_composition(method.organic_percent);
        self.column = ColumnProfile::from_method(&method);
        self.method = method;
        self.max_pressure = max_pressure;
    }

    /// Back-pressure of the current method.
    fn current_pressure(&self) -> PressureReading {
        compute_pressure(
            self.method.flow_rate,
            self.column.resistance,
            self.mobile_phase.viscosity,
            self.config.chemistry.pressure_scale,
            self.max_pressure,
        )
    }

    /// Pressure watchdog: recompute, publish, fault on over-pressure.
    fn check_pressure(&mut self) -> PressureReading {
        let reading = self.current_pressure();
        let change = self.machine.apply_pressure(reading);
        self.hub.emit(&EngineEvent::PressureUpdated {
            bar: reading.bar,
            warning: reading.warning,
        });
        if let Some(change) = change {
            self.emit_change(change);
        }
        reading
    }

    fn emit_change(&mut self, change: PhaseChange) {
        if !change.to.is_ticking() {
            self.clock.halt();
        }
        self.hub.emit(&EngineEvent::StateChanged {
            phase: change.to,
            previous: change.from,
            reason: change.reason,
        });
        if change.to == RunPhase::Ready {
            self.emit_estimated_retention();
        }
    }

    fn emit_estimated_retention(&mut self) {
        let times = match self.estimated_retention_times() {
            Ok(times) => times,
            Err(e) => {
                warn!("[{}] No retention estimate: {}", self.id, e);
                return;
            }
        };
        let names: Vec<String> = self.sample.compounds().iter().map(|c| c.name.clone()).collect();
        for (index, (compound, retention_time)) in names.into_iter().zip(times).enumerate() {
            self.hub.emit(&EngineEvent::EstimatedRetention {
                compound_index: index,
                compound,
                retention_time,
            });
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("phase", &self.machine.phase())
            .field("sample", &self.sample.id())
            .field("points", &self.chromatogram.len())
            .finish()
    }
}

/// Returns true if the change affects retention (column, mobile phase or flow).
fn changes_conditions(old: &MethodParameters, new: &MethodParameters) -> bool {
    old.flow_rate != new.flow_rate
        || old.organic_percent != new.organic_percent
        || old.column_type != new.column_type
        || old.column_length_mm != new.column_length_mm
        || old.particle_size_um != new.particle_size_um
}
