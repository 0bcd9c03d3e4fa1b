//! Scenario runner - executes teaching scenarios against a seeded engine.

use crate::context::SimContext;
use crate::exporter::RunExport;
use crate::scenarios::ScenarioId;

use hplc_core::{
    ChannelListener, ColumnType, Engine, EngineConfig, EngineError, EngineEvent, MethodPatch,
    RunPhase, SamplePoint,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Last sample time (min)
    pub final_time_min: f64,

    /// Phase the instrument ended in
    pub final_phase: RunPhase,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Sample events emitted
    pub samples: usize,

    /// Phase transitions observed
    pub state_changes: usize,

    /// Peaks scheduled by the last injection
    pub peaks_scheduled: usize,

    /// Highest detector reading
    pub max_signal: f64,

    /// Highest published back-pressure (bar)
    pub max_pressure_bar: f64,
}

/// One instrument under observation.
struct Trial {
    engine: Engine,
    events: UnboundedReceiver<EngineEvent>,
    log: Vec<EngineEvent>,
    ticks: u64,
}

impl Trial {
    fn new(config: &EngineConfig, seed: u64) -> Result<Self, String> {
        let config = EngineConfig {
            seed,
            ..config.clone()
        };
        let ctx = SimContext::new(seed);
        let mut engine = Engine::with_context(config, &ctx).map_err(|e| e.to_string())?;
        let (listener, events) = ChannelListener::new();
        engine.subscribe(listener);
        Ok(Self {
            engine,
            events,
            log: Vec::new(),
            ticks: 0,
        })
    }

    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.log.push(event);
        }
    }

    fn tick(&mut self) -> Option<SamplePoint> {
        let point = self.engine.tick();
        if point.is_some() {
            self.ticks += 1;
        }
        self.drain();
        point
    }

    fn run_until(&mut self, phase: RunPhase, max_ticks: u64) -> Result<(), String> {
        for _ in 0..max_ticks {
            if self.engine.phase() == phase {
                return Ok(());
            }
            if self.tick().is_none() {
                break;
            }
        }
        if self.engine.phase() == phase {
            return Ok(());
        }
        Err(format!(
            "expected {} but instrument is {} after {} ticks",
            phase,
            self.engine.phase(),
            self.ticks
        ))
    }

    fn run_to_end(&mut self, max_ticks: u64) {
        for _ in 0..max_ticks {
            if self.tick().is_none() {
                break;
            }
        }
    }

    fn pump_and_inject(&mut self, max_ticks: u64) -> Result<(), String> {
        self.engine.start_pump().map_err(|e| e.to_string())?;
        self.drain();
        self.run_until(RunPhase::Ready, max_ticks)?;
        self.engine.inject().map_err(|e| e.to_string())?;
        self.drain();
        Ok(())
    }

    fn phases(&self) -> Vec<RunPhase> {
        self.log
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StateChanged { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// Time of the highest reading within `[from, to]`.
    fn apex_between(&self, from: f64, to: f64) -> Option<SamplePoint> {
        self.engine
            .chromatogram()
            .iter()
            .filter(|p| p.time >= from && p.time <= to)
            .copied()
            .max_by(|a, b| a.value.total_cmp(&b.value))
    }

    fn metrics(&self) -> ScenarioMetrics {
        let mut metrics = ScenarioMetrics {
            peaks_scheduled: self.engine.state().scheduled_peaks.len(),
            max_signal: f64::NEG_INFINITY,
            ..Default::default()
        };
        for event in &self.log {
            match event {
                EngineEvent::Sample(point) => {
                    metrics.samples += 1;
                    metrics.max_signal = metrics.max_signal.max(point.value);
                }
                EngineEvent::StateChanged { .. } => metrics.state_changes += 1,
                EngineEvent::PressureUpdated { bar, .. } => {
                    metrics.max_pressure_bar = metrics.max_pressure_bar.max(*bar);
                }
                EngineEvent::EstimatedRetention { .. } => {}
            }
        }
        if metrics.samples == 0 {
            metrics.max_signal = 0.0;
        }
        metrics
    }
}

fn check(condition: bool, reason: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Runs teaching scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Engine configuration (its seed is replaced by `seed`)
    config: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with the default configuration.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: EngineConfig::default(),
        }
    }

    /// Uses a custom engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn max_ticks(&self) -> u64 {
        self.config.clock.ticks_per_run() + 10
    }

    /// Tolerance for apex timing: one sample step either side.
    fn apex_tolerance(&self) -> f64 {
        self.config.clock.dt_minutes * 1.5
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).0
    }

    /// Runs a scenario and also returns the export of its primary instrument.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, Option<RunExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let mut trial = match Trial::new(&self.config, self.seed) {
            Ok(trial) => trial,
            Err(reason) => {
                let result = ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_min: 0.0,
                    final_phase: RunPhase::Idle,
                    failure_reason: Some(reason),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, None);
            }
        };

        let outcome = trial
            .engine
            .select_sample(scenario.sample_id())
            .map_err(|e| e.to_string())
            .and_then(|_| match scenario {
                ScenarioId::StandardRun => self.run_standard(&mut trial),
                ScenarioId::MixtureRun => self.run_mixture(&mut trial),
                ScenarioId::OrganicShift => self.run_organic_shift(&mut trial),
                ScenarioId::OverPressure => self.run_over_pressure(&mut trial),
                ScenarioId::StopMidRun => self.run_stop_mid_run(&mut trial),
                ScenarioId::Reequilibration => self.run_reequilibration(&mut trial),
                ScenarioId::Determinism => self.run_determinism(&mut trial),
            });
        trial.drain();

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_ticks: trial.ticks,
            final_time_min: trial.engine.chromatogram().last().map(|p| p.time).unwrap_or(0.0),
            final_phase: trial.engine.phase(),
            failure_reason: outcome.err(),
            metrics: trial.metrics(),
        };

        let mut export = RunExport::new(scenario.name(), self.seed, &trial.engine.snapshot())
            .with_events(trial.log);
        export.finalize(result.passed, result.failure_reason.clone());

        (result, Some(export))
    }

    /// SIM-001: one compound, default method, pump to completion.
    fn run_standard(&self, trial: &mut Trial) -> Result<(), String> {
        let rt = trial.engine.estimated_retention_times().map_err(|e| e.to_string())?[0];
        let void_time = self.config.chemistry.void_time;

        trial.pump_and_inject(self.max_ticks())?;
        let injected_at = trial.engine.state().simulation_time;
        trial.run_to_end(self.max_ticks());

        let phases = trial.phases();
        let expected = [
            RunPhase::Pumping,
            RunPhase::Ready,
            RunPhase::Injected,
            RunPhase::Running,
            RunPhase::Completed,
        ];
        check(phases == expected, || format!("unexpected phase sequence {:?}", phases))?;

        let expected_apex = injected_at + rt - void_time;
        let apex = trial
            .apex_between(injected_at, f64::MAX)
            .ok_or("no samples after injection")?;
        check((apex.time - expected_apex).abs() <= self.apex_tolerance(), || {
            format!("apex at {:.3} min, predicted {:.3} min", apex.time, expected_apex)
        })?;

        let range = self.config.signal.detector_range;
        check(trial.engine.chromatogram().iter().all(|p| range.contains(p.value)), || {
            "reading outside the detector range".to_string()
        })?;

        let end = trial.engine.chromatogram().last().map(|p| p.time).unwrap_or(0.0);
        let expected_end = injected_at + self.config.clock.max_time_minutes;
        check((end - expected_end).abs() < 1e-6, || {
            format!("run ended at {:.3} min, expected {:.3} min", end, expected_end)
        })
    }

    /// SIM-002: mixture peaks appear in hydrophobicity order.
    fn run_mixture(&self, trial: &mut Trial) -> Result<(), String> {
        trial.pump_and_inject(self.max_ticks())?;
        trial.run_to_end(self.max_ticks());
        check(trial.engine.phase() == RunPhase::Completed, || {
            format!("run ended in {}", trial.engine.phase())
        })?;

        let peaks = trial.engine.state().scheduled_peaks.clone();
        check(peaks.len() == 3, || format!("{} peaks scheduled", peaks.len()))?;
        check(
            peaks.windows(2).all(|w| w[0].elution_time < w[1].elution_time),
            || "peaks out of hydrophobicity order".to_string(),
        )?;

        let tolerance = self.apex_tolerance();
        for peak in &peaks {
            let top = trial
                .apex_between(peak.elution_time - tolerance, peak.elution_time + tolerance)
                .ok_or_else(|| format!("no samples near {}", peak.compound.name))?;
            check(top.value >= 0.5 * peak.amplitude, || {
                format!(
                    "{} peak too small: {:.3} < {:.3}",
                    peak.compound.name,
                    top.value,
                    0.5 * peak.amplitude
                )
            })?;
        }
        Ok(())
    }

    /// SIM-003: 80 %B elutes caffeine earlier than 40 %B.
    fn run_organic_shift(&self, trial: &mut Trial) -> Result<(), String> {
        trial.pump_and_inject(self.max_ticks())?;
        trial.run_to_end(self.max_ticks());
        let slow = trial.apex_between(0.0, f64::MAX).ok_or("no baseline run")?;

        let mut strong = Trial::new(&self.config, self.seed)?;
        strong
            .engine
            .configure(&MethodPatch::new().organic_percent(80.0))
            .map_err(|e| e.to_string())?;
        strong.pump_and_inject(self.max_ticks())?;
        strong.run_to_end(self.max_ticks());
        let fast = strong.apex_between(0.0, f64::MAX).ok_or("no 80 %B run")?;

        info!(
            "  40 %B apex {:.3} min, 80 %B apex {:.3} min",
            slow.time, fast.time
        );
        check(fast.time < slow.time, || {
            format!("80 %B apex {:.3} not before 40 %B apex {:.3}", fast.time, slow.time)
        })
    }

    /// SIM-004: over-pressure method faults and refuses to pump.
    fn run_over_pressure(&self, trial: &mut Trial) -> Result<(), String> {
        trial
            .engine
            .configure(
                &MethodPatch::new()
                    .column_type(ColumnType::Silica)
                    .column_length_mm(250.0)
                    .particle_size_um(3.0)
                    .flow_rate(0.3),
            )
            .map_err(|e| e.to_string())?;
        trial.drain();
        check(trial.engine.phase() == RunPhase::Error, || {
            format!("expected ERROR after configure, got {}", trial.engine.phase())
        })?;

        match trial.engine.start_pump() {
            Err(EngineError::OverPressure { bar, max }) => {
                info!("  pump refused: {:.0} bar > {:.0} bar", bar, max);
            }
            other => return Err(format!("expected OverPressure, got {:?}", other)),
        }
        trial.drain();

        check(trial.tick().is_none(), || "clock ran in ERROR".to_string())?;
        check(trial.metrics().samples == 0, || "samples emitted in ERROR".to_string())?;
        check(
            trial
                .log
                .iter()
                .any(|e| matches!(e, EngineEvent::PressureUpdated { warning: true, .. })),
            || "no pressure warning published".to_string(),
        )
    }

    /// SIM-005: stopping mid-run silences the stream and keeps the trace.
    fn run_stop_mid_run(&self, trial: &mut Trial) -> Result<(), String> {
        trial.pump_and_inject(self.max_ticks())?;
        while trial.engine.state().simulation_time < 1.0 {
            if trial.tick().is_none() {
                return Err(format!("clock stopped early in {}", trial.engine.phase()));
            }
        }

        trial.engine.stop_pump();
        trial.drain();
        let events_at_stop = trial.log.len();
        let points_at_stop = trial.engine.chromatogram().len();

        for _ in 0..20 {
            check(trial.tick().is_none(), || "tick after stop produced a sample".to_string())?;
        }
        trial.engine.stop_pump();
        trial.drain();

        check(trial.log.len() == events_at_stop, || {
            format!("{} events after stop", trial.log.len() - events_at_stop)
        })?;
        check(trial.engine.phase() == RunPhase::Stopped, || {
            format!("ended in {}", trial.engine.phase())
        })?;
        check(trial.engine.chromatogram().len() == points_at_stop && points_at_stop > 0, || {
            "chromatogram not kept after stop".to_string()
        })?;
        check(trial.engine.pressure().bar == 0.0, || "pressure not released".to_string())
    }

    /// SIM-006: a live %B change withdraws READY until re-equilibrated.
    fn run_reequilibration(&self, trial: &mut Trial) -> Result<(), String> {
        trial.engine.start_pump().map_err(|e| e.to_string())?;
        trial.run_until(RunPhase::Ready, self.max_ticks())?;

        trial
            .engine
            .adjust_conditions(&MethodPatch::new().organic_percent(60.0))
            .map_err(|e| e.to_string())?;
        trial.drain();
        check(trial.engine.phase() == RunPhase::Equilibrating, || {
            format!("expected EQUILIBRATING, got {}", trial.engine.phase())
        })?;
        check(trial.engine.inject().is_err(), || {
            "inject accepted while equilibrating".to_string()
        })?;

        trial.run_until(RunPhase::Ready, self.max_ticks())?;
        trial.engine.inject().map_err(|e| e.to_string())?;
        trial.run_to_end(self.max_ticks());

        let ready_count = trial.phases().iter().filter(|p| **p == RunPhase::Ready).count();
        check(ready_count == 2, || format!("READY reached {} times", ready_count))?;
        check(trial.engine.phase() == RunPhase::Completed, || {
            format!("ended in {}", trial.engine.phase())
        })
    }

    /// SIM-007: identical seeds give identical traces; a new seed does not.
    fn run_determinism(&self, trial: &mut Trial) -> Result<(), String> {
        let replay = |seed: u64| -> Result<Vec<SamplePoint>, String> {
            let mut other = Trial::new(&self.config, seed)?;
            other
                .engine
                .select_sample(ScenarioId::Determinism.sample_id())
                .map_err(|e| e.to_string())?;
            other.pump_and_inject(self.max_ticks())?;
            other.run_to_end(self.max_ticks());
            Ok(other.engine.chromatogram().to_vec())
        };

        trial.pump_and_inject(self.max_ticks())?;
        trial.run_to_end(self.max_ticks());
        let first = trial.engine.chromatogram().to_vec();

        check(replay(self.seed)? == first, || {
            format!("seed {} produced two different traces", self.seed)
        })?;
        check(replay(self.seed.wrapping_add(1))? != first, || {
            "different seeds produced the same noise".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_run_metrics() {
        let result = ScenarioRunner::new(42).run(ScenarioId::StandardRun);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_phase, RunPhase::Completed);
        assert_eq!(result.metrics.samples as u64, result.total_ticks);
        assert_eq!(result.metrics.peaks_scheduled, 1);
        assert_eq!(result.metrics.state_changes, 5);
    }

    #[test]
    fn test_export_carries_events() {
        let (result, export) = ScenarioRunner::new(5).run_with_export(ScenarioId::MixtureRun);
        let export = export.unwrap();
        assert!(result.passed);
        assert_eq!(export.peaks.len(), 3);
        assert_eq!(export.points.len() as u64, result.total_ticks);
        assert!(export.events.len() > export.points.len());
    }
}
