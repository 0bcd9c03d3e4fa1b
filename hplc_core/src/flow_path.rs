//! Instrument flow path for the "build the instrument" exercise.
//!
//! Mobile phase runs reservoir → pump → injector → column → detector, and the
//! detector feeds the data system. A learner places parts in order and
//! [`check_assembly`] grades the attempt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentPart {
    Reservoir,
    Pump,
    Injector,
    Column,
    Detector,
    DataSystem,
}

/// Correct order of the parts along the flow.
pub const FLOW_PATH: [InstrumentPart; 6] = [
    InstrumentPart::Reservoir,
    InstrumentPart::Pump,
    InstrumentPart::Injector,
    InstrumentPart::Column,
    InstrumentPart::Detector,
    InstrumentPart::DataSystem,
];

impl InstrumentPart {
    pub fn id(&self) -> &'static str {
        match self {
            InstrumentPart::Reservoir => "reservoir",
            InstrumentPart::Pump => "pump",
            InstrumentPart::Injector => "injector",
            InstrumentPart::Column => "column",
            InstrumentPart::Detector => "detector",
            InstrumentPart::DataSystem => "datasystem",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentPart::Reservoir => "Solvent Reservoir",
            InstrumentPart::Pump => "Pump",
            InstrumentPart::Injector => "Injector",
            InstrumentPart::Column => "Column",
            InstrumentPart::Detector => "Detector",
            InstrumentPart::DataSystem => "Data System",
        }
    }

    /// What the part does in the instrument.
    pub fn function(&self) -> &'static str {
        match self {
            InstrumentPart::Reservoir => "Stores and supplies the mobile phase",
            InstrumentPart::Pump => "Delivers mobile phase at constant flow and pressure",
            InstrumentPart::Injector => "Introduces sample into the mobile phase stream",
            InstrumentPart::Column => "Separates components based on stationary phase interaction",
            InstrumentPart::Detector => "Detects eluted analytes and converts them into signals",
            InstrumentPart::DataSystem => "Processes and displays chromatographic data",
        }
    }
}

impl std::fmt::Display for InstrumentPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for InstrumentPart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_lowercase().replace(['_', ' ', '-'], "");
        FLOW_PATH
            .iter()
            .find(|p| p.id() == key)
            .copied()
            .ok_or_else(|| format!("Unknown instrument part: {}", s))
    }
}

/// Result of grading an assembly attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyReport {
    /// Number of positions holding the right part
    pub correct_positions: usize,
    /// Index of the first misplaced part, if any
    pub first_mismatch: Option<usize>,
    /// Parts that were never placed
    pub missing: Vec<InstrumentPart>,
}

impl AssemblyReport {
    pub fn is_complete(&self) -> bool {
        self.correct_positions == FLOW_PATH.len() && self.missing.is_empty()
    }
}

/// Grades a placed sequence against [`FLOW_PATH`].
pub fn check_assembly(placed: &[InstrumentPart]) -> AssemblyReport {
    let correct_positions = FLOW_PATH
        .iter()
        .zip(placed)
        .filter(|(expected, got)| expected == got)
        .count();

    let first_mismatch = (0..FLOW_PATH.len().max(placed.len()))
        .find(|&i| FLOW_PATH.get(i) != placed.get(i));

    let missing = FLOW_PATH
        .iter()
        .filter(|p| !placed.contains(p))
        .copied()
        .collect();

    AssemblyReport {
        correct_positions,
        first_mismatch,
        missing,
    }
}
