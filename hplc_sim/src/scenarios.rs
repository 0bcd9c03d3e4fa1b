//! Teaching scenarios run by the harness.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Default method, caffeine, pump to completion
    StandardRun,

    /// SIM-002: Three-compound mixture elutes in hydrophobicity order
    MixtureRun,

    /// SIM-003: More organic modifier elutes earlier
    OrganicShift,

    /// SIM-004: Packed silica column over-pressures
    OverPressure,

    /// SIM-005: Pump stopped mid-run; stream goes quiet
    StopMidRun,

    /// SIM-006: Live condition change withdraws READY
    Reequilibration,

    /// SIM-007: Same seed, same chromatogram
    Determinism,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StandardRun,
            ScenarioId::MixtureRun,
            ScenarioId::OrganicShift,
            ScenarioId::OverPressure,
            ScenarioId::StopMidRun,
            ScenarioId::Reequilibration,
            ScenarioId::Determinism,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StandardRun => "standard_run",
            ScenarioId::MixtureRun => "mixture_run",
            ScenarioId::OrganicShift => "organic_shift",
            ScenarioId::OverPressure => "over_pressure",
            ScenarioId::StopMidRun => "stop_mid_run",
            ScenarioId::Reequilibration => "reequilibration",
            ScenarioId::Determinism => "determinism",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StandardRun => "C18, 40 %B, 1 mL/min: caffeine apex near its predicted RT",
            ScenarioId::MixtureRun => "Paracetamol, caffeine, aspirin resolve in order",
            ScenarioId::OrganicShift => "40 %B vs 80 %B: stronger mobile phase elutes sooner",
            ScenarioId::OverPressure => "Silica 250 mm / 3 µm at 0.3 mL/min faults to ERROR",
            ScenarioId::StopMidRun => "Stop during elution: no samples after stop, history kept",
            ScenarioId::Reequilibration => "Change %B at READY: re-equilibrate, then inject",
            ScenarioId::Determinism => "Two instruments with one seed produce identical traces",
        }
    }

    /// Sample injected by the scenario.
    pub fn sample_id(&self) -> &'static str {
        match self {
            ScenarioId::MixtureRun | ScenarioId::Determinism => "analgesic_mix",
            _ => "caffeine",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard_run" | "standard" | "sim-001" => Ok(ScenarioId::StandardRun),
            "mixture_run" | "mixture" | "sim-002" => Ok(ScenarioId::MixtureRun),
            "organic_shift" | "organic" | "sim-003" => Ok(ScenarioId::OrganicShift),
            "over_pressure" | "overpressure" | "sim-004" => Ok(ScenarioId::OverPressure),
            "stop_mid_run" | "stop" | "sim-005" => Ok(ScenarioId::StopMidRun),
            "reequilibration" | "reequilibrate" | "sim-006" => Ok(ScenarioId::Reequilibration),
            "determinism" | "sim-007" => Ok(ScenarioId::Determinism),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
