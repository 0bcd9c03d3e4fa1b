//! The "CHEMISTRY" Model - retention, peak shape and back-pressure
//!
//! Pure functions that turn method parameters plus a compound description
//! into retention times and peak shapes, and turn mobile-phase/column
//! settings into viscosity and back-pressure.
//!
//! This is a teaching approximation, not a validated retention model:
//!
//! ```text
//! strength = 0.3 + 0.7 * %B / 100
//! RT       = t0 + (hydrophobicity * column_factor) / (flow * strength)
//! width    = k / efficiency
//! pressure = flow * resistance * viscosity * scale
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Column length the presets are calibrated for (mm).
pub const REFERENCE_LENGTH_MM: f64 = 150.0;

/// Particle size the presets are calibrated for (µm).
pub const REFERENCE_PARTICLE_UM: f64 = 5.0;

/// Plate-count normalisation: a 150 mm / 5 µm column has efficiency 1.0.
const EFFICIENCY_DIVISOR: f64 = 30.0;

// =============================================================================
// METHOD PARAMETERS
// =============================================================================

/// Stationary-phase chemistry of the installed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Octadecyl reversed phase (most retentive)
    C18,
    /// Octyl reversed phase
    C8,
    /// Bare silica (normal phase, tightly packed)
    Silica,
}

/// Base retention factor and flow resistance of a column chemistry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnPreset {
    pub factor: f64,
    pub resistance: f64,
}

impl ColumnType {
    /// Returns all column types.
    pub fn all() -> [ColumnType; 3] {
        [ColumnType::C18, ColumnType::C8, ColumnType::Silica]
    }

    /// Returns the preset for a 150 mm / 5 µm column of this chemistry.
    pub fn preset(&self) -> ColumnPreset {
        match self {
            ColumnType::C18 => ColumnPreset { factor: 1.0, resistance: 1.2 },
            ColumnType::C8 => ColumnPreset { factor: 0.8, resistance: 1.0 },
            ColumnType::Silica => ColumnPreset { factor: 1.3, resistance: 1.8 },
        }
    }

    /// Returns the column type name.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::C18 => "C18",
            ColumnType::C8 => "C8",
            ColumnType::Silica => "Silica",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c18" | "ods" => Ok(ColumnType::C18),
            "c8" | "octyl" => Ok(ColumnType::C8),
            "silica" | "si" => Ok(ColumnType::Silica),
            _ => Err(format!("Unknown column type: {}", s)),
        }
    }
}

/// User-editable method parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodParameters {
    /// Pump flow rate (mL/min, > 0)
    pub flow_rate: f64,

    /// Organic modifier (solvent B) in the mobile phase (0-100 %)
    pub organic_percent: f64,

    /// Installed column chemistry
    pub column_type: ColumnType,

    /// Column length (mm, > 0)
    pub column_length_mm: f64,

    /// Packing particle size (µm, > 0)
    pub particle_size_um: f64,

    /// Detector gain multiplier (> 0)
    pub sensitivity: f64,

    /// UV detector wavelength (nm, > 0)
    pub detector_wavelength_nm: f64,
}

impl Default for MethodParameters {
    fn default() -> Self {
        Self {
            flow_rate: 1.0,
            organic_percent: 40.0,
            column_type: ColumnType::C18,
            column_length_mm: REFERENCE_LENGTH_MM,
            particle_size_um: REFERENCE_PARTICLE_UM,
            sensitivity: 1.0,
            detector_wavelength_nm: 254.0,
        }
    }
}

/// Partial update of the method. Validated all-or-nothing by [`MethodPatch::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodPatch {
    pub flow_rate: Option<f64>,
    pub organic_percent: Option<f64>,
    pub column_type: Option<ColumnType>,
    pub column_length_mm: Option<f64>,
    pub particle_size_um: Option<f64>,
    pub sensitivity: Option<f64>,
    pub detector_wavelength_nm: Option<f64>,
    pub max_pressure: Option<f64>,
}

impl MethodPatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_rate(mut self, ml_min: f64) -> Self {
        self.flow_rate = Some(ml_min);
        self
    }

    pub fn organic_percent(mut self, percent: f64) -> Self {
        self.organic_percent = Some(percent);
        self
    }

    pub fn column_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    pub fn column_length_mm(mut self, mm: f64) -> Self {
        self.column_length_mm = Some(mm);
        self
    }

    pub fn particle_size_um(mut self, um: f64) -> Self {
        self.particle_size_um = Some(um);
        self
    }

    pub fn sensitivity(mut self, gain: f64) -> Self {
        self.sensitivity = Some(gain);
        self
    }

    pub fn detector_wavelength_nm(mut self, nm: f64) -> Self {
        self.detector_wavelength_nm = Some(nm);
        self
    }

    pub fn max_pressure(mut self, bar: f64) -> Self {
        self.max_pressure = Some(bar);
        self
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validates every field and returns the patched method and pressure ceiling.
    ///
    /// Nothing is returned unless every present field is in range, so callers
    /// can apply the result wholesale.
    pub fn resolve(
        &self,
        current: &MethodParameters,
        current_max_pressure: f64,
    ) -> Result<(MethodParameters, f64)> {
        let mut method = current.clone();

        if let Some(v) = self.flow_rate {
            method.flow_rate = require_positive("flow_rate", v)?;
        }
        if let Some(v) = self.organic_percent {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(EngineError::invalid_parameter(
                    "organic_percent",
                    format!("{} is outside 0-100 %", v),
                ));
            }
            method.organic_percent = v;
        }
        if let Some(t) = self.column_type {
            method.column_type = t;
        }
        if let Some(v) = self.column_length_mm {
            method.column_length_mm = require_positive("column_length_mm", v)?;
        }
        if let Some(v) = self.particle_size_um {
            method.particle_size_um = require_positive("particle_size_um", v)?;
        }
        if let Some(v) = self.sensitivity {
            method.sensitivity = require_positive("sensitivity", v)?;
        }
        if let Some(v) = self.detector_wavelength_nm {
            method.detector_wavelength_nm = require_positive("detector_wavelength_nm", v)?;
        }

        let max_pressure = match self.max_pressure {
            Some(v) => require_positive("max_pressure", v)?,
            None => current_max_pressure,
        };

        Ok((method, max_pressure))
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::invalid_parameter(field, format!("{} must be > 0", value)))
    }
}

// =============================================================================
// MOBILE PHASE & COLUMN
// =============================================================================

/// One solvent line feeding the pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solvent {
    pub name: String,
    pub percent: f64,
    /// Relative viscosity (water = 1.0)
    pub viscosity: f64,
}

/// Binary mobile phase. `solvent_a.percent + solvent_b.percent == 100` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobilePhase {
    pub solvent_a: Solvent,
    pub solvent_b: Solvent,
    /// Elution strength derived from %B
    pub strength: f64,
    /// Percent-weighted viscosity
    pub viscosity: f64,
}

impl MobilePhase {
    /// Water / acetonitrile mobile phase at the given %B.
    pub fn water_acetonitrile(organic_percent: f64) -> Self {
        let mut phase = Self {
            solvent_a: Solvent {
                name: "Water".to_string(),
                percent: 100.0,
                viscosity: 1.0,
            },
            solvent_b: Solvent {
                name: "Acetonitrile".to_string(),
                percent: 0.0,
                viscosity: 0.4,
            },
            strength: 0.0,
            viscosity: 0.0,
        };
        phase.set_composition(organic_percent);
        phase
    }

    /// Sets %B and recomputes the derived fields.
    pub fn set_composition(&mut self, organic_percent: f64) {
        let b = organic_percent.clamp(0.0, 100.0);
        self.solvent_b.percent = b;
        self.solvent_a.percent = 100.0 - b;
        self.strength = compute_elution_strength(b);
        self.viscosity = compute_viscosity(self);
    }
}

impl Default for MobilePhase {
    fn default() -> Self {
        Self::water_acetonitrile(MethodParameters::default().organic_percent)
    }
}

/// Installed column, scaled from its chemistry preset by geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column_type: ColumnType,
    pub length_mm: f64,
    pub particle_size_um: f64,
    /// Retention factor (longer column retains longer)
    pub factor: f64,
    /// Flow resistance (∝ length / dp²)
    pub resistance: f64,
    /// Relative plate count (length / dp / 30)
    pub efficiency: f64,
}

impl ColumnProfile {
    /// Builds a profile from chemistry and geometry.
    ///
    /// Geometry must be positive; [`MethodPatch::resolve`] guarantees this
    /// for anything that reaches the engine.
    pub fn new(column_type: ColumnType, length_mm: f64, particle_size_um: f64) -> Self {
        let preset = column_type.preset();
        let length_ratio = length_mm / REFERENCE_LENGTH_MM;
        let particle_ratio = particle_size_um / REFERENCE_PARTICLE_UM;

        Self {
            column_type,
            length_mm,
            particle_size_um,
            factor: preset.factor * length_ratio,
            resistance: preset.resistance * length_ratio / (particle_ratio * particle_ratio),
            efficiency: length_mm / particle_size_um / EFFICIENCY_DIVISOR,
        }
    }

    /// Builds the profile described by a method.
    pub fn from_method(method: &MethodParameters) -> Self {
        Self::new(method.column_type, method.column_length_mm, method.particle_size_um)
    }
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self::from_method(&MethodParameters::default())
    }
}

// =============================================================================
// COMPOUNDS & SAMPLES
// =============================================================================

/// An analyte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub name: String,
    /// Affinity for the stationary phase (0-1)
    pub hydrophobicity: f64,
    /// Peak height at sensitivity 1.0 and optimal wavelength
    pub response_height: f64,
    /// Absorbance maximum (nm), if the detector wavelength should matter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_max_nm: Option<f64>,
}

impl Compound {
    pub fn new(name: impl Into<String>, hydrophobicity: f64, response_height: f64) -> Self {
        Self {
            name: name.into(),
            hydrophobicity,
            response_height,
            uv_max_nm: None,
        }
    }

    pub fn with_uv_max(mut self, nm: f64) -> Self {
        self.uv_max_nm = Some(nm);
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.hydrophobicity.is_finite() || !(0.0..=1.0).contains(&self.hydrophobicity) {
            return Err(EngineError::invalid_parameter(
                "hydrophobicity",
                format!("{}: {} is outside 0-1", self.name, self.hydrophobicity),
            ));
        }
        if !self.response_height.is_finite() || self.response_height < 0.0 {
            return Err(EngineError::invalid_parameter(
                "response_height",
                format!("{}: {} must be >= 0", self.name, self.response_height),
            ));
        }
        if let Some(nm) = self.uv_max_nm {
            require_positive("uv_max_nm", nm)?;
        }
        Ok(())
    }
}

/// An injectable sample: one or more compounds, in injection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    id: String,
    compounds: Vec<Compound>,
}

impl Sample {
    /// Creates a sample. Fails if empty or if any compound is out of range.
    pub fn new(id: impl Into<String>, compounds: Vec<Compound>) -> Result<Self> {
        if compounds.is_empty() {
            return Err(EngineError::invalid_parameter(
                "sample",
                "a sample needs at least one compound",
            ));
        }
        for compound in &compounds {
            compound.validate()?;
        }
        Ok(Self {
            id: id.into(),
            compounds,
        })
    }

    /// Creates a single-compound sample keyed by the compound name.
    pub fn single(compound: Compound) -> Result<Self> {
        let id = compound.name.to_lowercase();
        Self::new(id, vec![compound])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn compounds(&self) -> &[Compound] {
        &self.compounds
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }
}

/// A peak fixed at injection time. Immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledPeak {
    pub compound: Compound,
    /// Absolute simulation time of the peak apex (min)
    pub elution_time: f64,
    /// Column-derived peak width (min)
    pub width: f64,
    /// Apex height before noise and clamping
    pub amplitude: f64,
}

// =============================================================================
// MODEL FUNCTIONS
// =============================================================================

/// Tunable constants of the chemistry model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemistryConfig {
    /// Column dead time (min)
    pub void_time: f64,

    /// Width constant k in `width = k / efficiency`
    pub peak_width_k: f64,

    /// Pressure scale constant (bar per unit of flow*resistance*viscosity)
    pub pressure_scale: f64,

    /// Pressure ceiling (bar)
    pub max_pressure: f64,

    /// Detector spectral bandwidth for the wavelength response (nm)
    pub uv_bandwidth_nm: f64,
}

impl Default for ChemistryConfig {
    fn default() -> Self {
        Self {
            void_time: 1.0,
            peak_width_k: 0.15,
            pressure_scale: 220.0,
            max_pressure: 400.0,
            uv_bandwidth_nm: 40.0,
        }
    }
}

impl ChemistryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.void_time.is_finite() || self.void_time < 0.0 {
            return Err(EngineError::invalid_parameter("void_time", "must be >= 0"));
        }
        require_positive("peak_width_k", self.peak_width_k)?;
        require_positive("pressure_scale", self.pressure_scale)?;
        require_positive("max_pressure", self.max_pressure)?;
        require_positive("uv_bandwidth_nm", self.uv_bandwidth_nm)?;
        Ok(())
    }
}

/// Back-pressure against the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureReading {
    pub bar: f64,
    pub max: f64,
    pub warning: bool,
}

/// Elution strength of the mobile phase: `0.3 + 0.7 * %B / 100`, in [0.3, 1.0].
pub fn compute_elution_strength(organic_percent: f64) -> f64 {
    0.3 + 0.7 * organic_percent.clamp(0.0, 100.0) / 100.0
}

/// Retention time of a compound (min).
///
/// Rejects a non-positive `flow_rate * elution_strength` instead of
/// returning infinity.
pub fn compute_retention_time(
    flow_rate: f64,
    elution_strength: f64,
    compound: &Compound,
    column_factor: f64,
    void_time: f64,
) -> Result<f64> {
    let divisor = flow_rate * elution_strength;
    if !divisor.is_finite() || divisor <= 0.0 {
        return Err(EngineError::invalid_parameter(
            "flow_rate",
            format!("flow {} x strength {} leaves no elution", flow_rate, elution_strength),
        ));
    }
    Ok(void_time + compound.hydrophobicity * column_factor / divisor)
}

/// Peak width (min): inversely proportional to column efficiency.
pub fn compute_peak_width(column_efficiency: f64, k: f64) -> f64 {
    k / column_efficiency.max(f64::MIN_POSITIVE)
}

/// Percent-weighted viscosity of a binary mobile phase.
pub fn compute_viscosity(mobile_phase: &MobilePhase) -> f64 {
    let a = &mobile_phase.solvent_a;
    let b = &mobile_phase.solvent_b;
    (a.percent * a.viscosity + b.percent * b.viscosity) / 100.0
}

/// Linear back-pressure model.
pub fn compute_pressure(
    flow_rate: f64,
    column_resistance: f64,
    viscosity: f64,
    scale: f64,
    max_pressure: f64,
) -> PressureReading {
    let bar = flow_rate * column_resistance * viscosity * scale;
    PressureReading {
        bar,
        max: max_pressure,
        warning: bar > max_pressure,
    }
}

/// Relative detector response at `detector_nm` for a compound absorbing at `uv_max_nm`.
///
/// Compounds without a known absorbance maximum respond fully at any wavelength.
pub fn wavelength_response(detector_nm: f64, uv_max_nm: Option<f64>, bandwidth_nm: f64) -> f64 {
    match uv_max_nm {
        Some(max) => {
            let offset = detector_nm - max;
            (-(offset * offset) / (2.0 * bandwidth_nm * bandwidth_nm)).exp()
        }
        None => 1.0,
    }
}

/// Retention time of every compound of a sample under the current conditions.
///
/// Used for the pre-injection preview.
pub fn estimate_retention_times(
    sample: &Sample,
    method: &MethodParameters,
    mobile_phase: &MobilePhase,
    column: &ColumnProfile,
    config: &ChemistryConfig,
) -> Result<Vec<f64>> {
    sample
        .compounds()
        .iter()
        .map(|compound| {
            compute_retention_time(
                method.flow_rate,
                mobile_phase.strength,
                compound,
                column.factor,
                config.void_time,
            )
        })
        .collect()
}

/// Fixes the peaks of an injection made at `base_sim_time`.
///
/// Each compound elutes at `base + (RT - t0)`, never before the injection.
/// The returned order is the sample order, including for equal elution times.
pub fn schedule_elutions_for_sample(
    sample: &Sample,
    method: &MethodParameters,
    mobile_phase: &MobilePhase,
    column: &ColumnProfile,
    base_sim_time: f64,
    config: &ChemistryConfig,
) -> Result<Vec<ScheduledPeak>> {
    let width = compute_peak_width(column.efficiency, config.peak_width_k);
    let retention_times = estimate_retention_times(sample, method, mobile_phase, column, config)?;

    Ok(sample
        .compounds()
        .iter()
        .zip(retention_times)
        .map(|(compound, rt)| {
            let elution_time = (base_sim_time + (rt - config.void_time)).max(base_sim_time);
            let amplitude = compound.response_height
                * method.sensitivity
                * wavelength_response(
                    method.detector_wavelength_nm,
                    compound.uv_max_nm,
                    config.uv_bandwidth_nm,
                );

            ScheduledPeak {
                compound: compound.clone(),
                elution_time,
                width,
                amplitude,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn caffeine() -> Compound {
        Compound::new("Caffeine", 0.55, 1.0)
    }

    #[test]
    fn test_elution_strength_bounds() {
        assert_relative_eq!(compute_elution_strength(0.0), 0.3);
        assert_relative_eq!(compute_elution_strength(40.0), 0.58);
        assert_relative_eq!(compute_elution_strength(100.0), 1.0);
        assert_relative_eq!(compute_elution_strength(150.0), 1.0);
    }

    #[test]
    fn test_reference_retention_time() {
        // 1.0 + 0.55 / (1.0 * 0.58)
        let strength = compute_elution_strength(40.0);
        let rt = compute_retention_time(1.0, strength, &caffeine(), 1.0, 1.0).unwrap();
        assert_relative_eq!(rt, 1.948, epsilon = 0.01);
    }

    #[test]
    fn test_more_organic_elutes_earlier() {
        let rt_40 = compute_retention_time(1.0, compute_elution_strength(40.0), &caffeine(), 1.0, 1.0)
            .unwrap();
        let rt_80 = compute_retention_time(1.0, compute_elution_strength(80.0), &caffeine(), 1.0, 1.0)
            .unwrap();
        assert!(rt_80 < rt_40);
    }

    #[test]
    fn test_zero_flow_is_rejected() {
        let err = compute_retention_time(0.0, 0.58, &caffeine(), 1.0, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { field: "flow_rate", .. }));
    }

    #[test]
    fn test_default_mobile_phase() {
        let phase = MobilePhase::default();
        assert_relative_eq!(phase.solvent_a.percent + phase.solvent_b.percent, 100.0);
        assert_relative_eq!(phase.viscosity, 0.76, epsilon = 1e-9);
        assert_relative_eq!(phase.strength, 0.58, epsilon = 1e-9);
    }

    #[test]
    fn test_column_profile_scaling() {
        let reference = ColumnProfile::default();
        assert_relative_eq!(reference.factor, 1.0);
        assert_relative_eq!(reference.resistance, 1.2);
        assert_relative_eq!(reference.efficiency, 1.0);

        // Half the particle size quadruples resistance and doubles efficiency
        let fine = ColumnProfile::new(ColumnType::C18, 150.0, 2.5);
        assert_relative_eq!(fine.resistance, 4.8, epsilon = 1e-9);
        assert_relative_eq!(fine.efficiency, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_peak_width_narrows_with_efficiency() {
        assert_relative_eq!(compute_peak_width(1.0, 0.15), 0.15);
        assert!(compute_peak_width(2.0, 0.15) < compute_peak_width(1.0, 0.15));
    }

    #[test]
    fn test_default_pressure_is_within_limit() {
        let phase = MobilePhase::default();
        let column = ColumnProfile::default();
        let reading = compute_pressure(1.0, column.resistance, phase.viscosity, 220.0, 400.0);
        assert_relative_eq!(reading.bar, 200.64, epsilon = 1e-6);
        assert!(!reading.warning);

        let low_flow = compute_pressure(0.1, column.resistance, phase.viscosity, 220.0, 400.0);
        assert!(!low_flow.warning);
    }

    #[test]
    fn test_packed_silica_overpressures() {
        let phase = MobilePhase::default();
        let column = ColumnProfile::new(ColumnType::Silica, 250.0, 3.0);
        let reading = compute_pressure(0.3, column.resistance, phase.viscosity, 220.0, 400.0);
        assert!(reading.warning, "expected warning at {:.0} bar", reading.bar);
    }

    #[test]
    fn test_schedule_keeps_sample_order() {
        let sample = Sample::new(
            "mix",
            vec![
                Compound::new("Paracetamol", 0.35, 1.0),
                Compound::new("Caffeine", 0.55, 1.0),
            ],
        )
        .unwrap();
        let peaks = schedule_elutions_for_sample(
            &sample,
            &MethodParameters::default(),
            &MobilePhase::default(),
            &ColumnProfile::default(),
            0.0,
            &ChemistryConfig::default(),
        )
        .unwrap();

        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].compound.name, "Paracetamol");
        assert_eq!(peaks[1].compound.name, "Caffeine");
        assert!(peaks[0].elution_time < peaks[1].elution_time);
        assert_relative_eq!(peaks[1].elution_time, 0.55 / 0.58, epsilon = 1e-9);
    }

    #[test]
    fn test_schedule_is_relative_to_injection() {
        let sample = Sample::single(caffeine()).unwrap();
        let method = MethodParameters::default();
        let config = ChemistryConfig::default();
        let at_zero = schedule_elutions_for_sample(
            &sample, &method, &MobilePhase::default(), &ColumnProfile::default(), 0.0, &config,
        )
        .unwrap();
        let at_two = schedule_elutions_for_sample(
            &sample, &method, &MobilePhase::default(), &ColumnProfile::default(), 2.0, &config,
        )
        .unwrap();

        assert_relative_eq!(at_two[0].elution_time - at_zero[0].elution_time, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unretained_compound_elutes_at_injection() {
        let sample = Sample::single(Compound::new("Uracil", 0.0, 1.0)).unwrap();
        let peaks = schedule_elutions_for_sample(
            &sample,
            &MethodParameters::default(),
            &MobilePhase::default(),
            &ColumnProfile::default(),
            3.0,
            &ChemistryConfig::default(),
        )
        .unwrap();
        assert_relative_eq!(peaks[0].elution_time, 3.0);
    }

    #[test]
    fn test_wavelength_response() {
        assert_relative_eq!(wavelength_response(254.0, None, 40.0), 1.0);
        assert_relative_eq!(wavelength_response(273.0, Some(273.0), 40.0), 1.0);
        let off = wavelength_response(254.0, Some(273.0), 40.0);
        assert!(off < 1.0 && off > 0.8);
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let current = MethodParameters::default();
        let patch = MethodPatch::new().organic_percent(60.0).flow_rate(-1.0);
        let err = patch.resolve(&current, 400.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { field: "flow_rate", .. }));

        let (method, max) = MethodPatch::new()
            .organic_percent(60.0)
            .column_type(ColumnType::C8)
            .max_pressure(600.0)
            .resolve(&current, 400.0)
            .unwrap();
        assert_relative_eq!(method.organic_percent, 60.0);
        assert_eq!(method.column_type, ColumnType::C8);
        assert_relative_eq!(max, 600.0);
    }

    #[test]
    fn test_sample_validation() {
        assert!(Sample::new("empty", vec![]).is_err());
        assert!(Sample::single(Compound::new("Odd", 1.5, 1.0)).is_err());
        assert!(Sample::single(Compound::new("Odd", 0.5, -1.0)).is_err());
    }

    #[test]
    fn test_column_type_parse() {
        assert_eq!("c18".parse::<ColumnType>().unwrap(), ColumnType::C18);
        assert_eq!("SILICA".parse::<ColumnType>().unwrap(), ColumnType::Silica);
        assert!("c4".parse::<ColumnType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_elution_strength_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let s_lo = compute_elution_strength(lo);
            let s_hi = compute_elution_strength(hi);
            prop_assert!(s_lo <= s_hi);
            prop_assert!((0.3..=1.0).contains(&s_lo));
            prop_assert!((0.3..=1.0).contains(&s_hi));
        }

        #[test]
        fn prop_faster_flow_elutes_earlier(
            flow in 0.05f64..5.0,
            extra in 0.01f64..5.0,
            hydrophobicity in 0.01f64..=1.0,
            organic in 0.0f64..=100.0,
        ) {
            let compound = Compound::new("X", hydrophobicity, 1.0);
            let strength = compute_elution_strength(organic);
            let slow = compute_retention_time(flow, strength, &compound, 1.0, 1.0).unwrap();
            let fast = compute_retention_time(flow + extra, strength, &compound, 1.0, 1.0).unwrap();
            prop_assert!(fast < slow);
        }
    }
}
