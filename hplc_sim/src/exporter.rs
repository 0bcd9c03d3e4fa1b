//! JSON exporter for chromatogram plotting.
//!
//! Exports one run (trace, events, scheduled peaks) as a single JSON document.

use hplc_core::{EngineEvent, EngineSnapshot, MethodParameters, SamplePoint, ScheduledPeak};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A scheduled peak as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub compound: String,
    pub elution_time: f64,
    pub width: f64,
    pub amplitude: f64,
}

impl From<&ScheduledPeak> for PeakRecord {
    fn from(peak: &ScheduledPeak) -> Self {
        Self {
            compound: peak.compound.name.clone(),
            elution_time: peak.elution_time,
            width: peak.width,
            amplitude: peak.amplitude,
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Short instrument id
    pub instrument: String,

    /// Method in effect at the end of the run
    pub method: MethodParameters,

    pub sample_id: String,

    /// Run duration in simulated minutes
    pub duration_min: f64,

    /// Detector trace
    pub points: Vec<SamplePoint>,

    /// Every event, including samples
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<EngineEvent>,

    pub peaks: Vec<PeakRecord>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl RunExport {
    /// Creates an export container from an engine snapshot.
    pub fn new(scenario: &str, seed: u64, snapshot: &EngineSnapshot) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            instrument: snapshot.id.to_string(),
            method: snapshot.method.clone(),
            sample_id: snapshot.sample_id.clone(),
            duration_min: snapshot.chromatogram.last().map(|p| p.time).unwrap_or(0.0),
            points: snapshot.chromatogram.clone(),
            events: Vec::new(),
            peaks: snapshot.run.scheduled_peaks.iter().map(PeakRecord::from).collect(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Attaches the event log.
    pub fn with_events(mut self, events: Vec<EngineEvent>) -> Self {
        self.events = events;
        self
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
