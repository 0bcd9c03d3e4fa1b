//! The "DETECTOR" - synthetic chromatogram signal
//!
//! Produces one scalar absorbance-like reading per tick:
//! - Baseline noise (zero-mean, bounded, scaled by sensitivity)
//! - Superposed Gaussian peaks from the scheduled elutions
//! - Saturation clamp to the detector range

use crate::chemistry::ScheduledPeak;
use crate::error::{EngineError, Result};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Smallest peak sigma (min); keeps a zero-time peak from dividing by zero.
const MIN_SIGMA: f64 = 1e-3;

/// One detector reading streamed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Simulation time (min)
    pub time: f64,
    /// Detector response (AU)
    pub value: f64,
}

/// Detector output limits. Readings outside are clamped (saturation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorRange {
    pub min: f64,
    pub max: f64,
}

impl DetectorRange {
    /// Builds a range; `min` must be below `max` and both finite.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(EngineError::invalid_parameter(
                "detector_range",
                format!("[{}, {}] is empty", self.min, self.max),
            ));
        }
        Ok(())
    }

    /// Clamps a raw reading into the range.
    ///
    /// Never panics; an inverted range pins every reading to `max`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for DetectorRange {
    fn default() -> Self {
        Self { min: -0.3, max: 3.0 }
    }
}

/// How a peak's Gaussian sigma is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PeakShape {
    /// sigma = the column-derived width of the peak
    ColumnEfficiency,
    /// sigma = max(eps, elution_time * k): later peaks are proportionally broader
    ProportionalToRetention { k: f64 },
}

impl Default for PeakShape {
    fn default() -> Self {
        PeakShape::ColumnEfficiency
    }
}

/// Tunable constants of the detector model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Peak-to-peak baseline noise at sensitivity 1.0 (AU)
    pub noise_amplitude: f64,

    /// Output saturation range
    pub detector_range: DetectorRange,

    /// Peak sigma rule
    pub peak_shape: PeakShape,

    /// Peaks farther than this many sigmas contribute exactly zero
    pub cutoff_sigmas: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            noise_amplitude: 0.02,
            detector_range: DetectorRange::default(),
            peak_shape: PeakShape::default(),
            cutoff_sigmas: 6.0,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.noise_amplitude.is_finite() || self.noise_amplitude < 0.0 {
            return Err(EngineError::invalid_parameter("noise_amplitude", "must be >= 0"));
        }
        self.detector_range.validate()?;
        if let PeakShape::ProportionalToRetention { k } = self.peak_shape {
            if !k.is_finite() || k <= 0.0 {
                return Err(EngineError::invalid_parameter("peak_shape.k", "must be > 0"));
            }
        }
        if !self.cutoff_sigmas.is_finite() || self.cutoff_sigmas <= 0.0 {
            return Err(EngineError::invalid_parameter("cutoff_sigmas", "must be > 0"));
        }
        Ok(())
    }
}

/// Gaussian sigma of a peak under the given shape rule.
pub fn peak_sigma(peak: &ScheduledPeak, shape: PeakShape) -> f64 {
    match shape {
        PeakShape::ColumnEfficiency => peak.width.max(MIN_SIGMA),
        PeakShape::ProportionalToRetention { k } => (peak.elution_time * k).max(MIN_SIGMA),
    }
}

/// Deterministic (noise-free) part of the signal at `sim_time`.
///
/// Peaks beyond `cutoff_sigmas` are skipped entirely.
pub fn peak_contribution(
    sim_time: f64,
    peaks: &[ScheduledPeak],
    shape: PeakShape,
    cutoff_sigmas: f64,
) -> f64 {
    peaks
        .iter()
        .filter_map(|peak| {
            let sigma = peak_sigma(peak, shape);
            let offset = sim_time - peak.elution_time;
            if offset.abs() > cutoff_sigmas * sigma {
                return None;
            }
            Some(peak.amplitude * (-(offset * offset) / (2.0 * sigma * sigma)).exp())
        })
        .sum()
}

/// Detector model: noise + peaks, clamped.
///
/// The only non-deterministic input is the RNG; seed it for reproducible runs.
pub struct SignalSynthesizer {
    config: SignalConfig,
    rng: ChaCha8Rng,
    noise: Uniform<f64>,
}

impl SignalSynthesizer {
    pub fn new(config: SignalConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rng,
            noise: Uniform::new(-0.5, 0.5),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// One baseline noise draw, bounded to ±noise_amplitude*sensitivity/2.
    pub fn baseline_noise(&mut self, sensitivity: f64) -> f64 {
        self.noise.sample(&mut self.rng) * self.config.noise_amplitude * sensitivity
    }

    /// Detector reading at `sim_time`, clamped to `range`.
    pub fn sample_at(
        &mut self,
        sim_time: f64,
        peaks: &[ScheduledPeak],
        sensitivity: f64,
        range: DetectorRange,
    ) -> f64 {
        let noise = self.baseline_noise(sensitivity);
        let signal = peak_contribution(
            sim_time,
            peaks,
            self.config.peak_shape,
            self.config.cutoff_sigmas,
        );
        range.clamp(noise + signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::Compound;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn peak(time: f64, width: f64, amplitude: f64) -> ScheduledPeak {
        ScheduledPeak {
            compound: Compound::new("Caffeine", 0.55, 1.0),
            elution_time: time,
            width,
            amplitude,
        }
    }

    fn synth(config: SignalConfig) -> SignalSynthesizer {
        SignalSynthesizer::new(config, ChaCha8Rng::seed_from_u64(42))
    }

    #[test]
    fn test_apex_height() {
        let peaks = [peak(2.0, 0.15, 1.0)];
        let at_apex = peak_contribution(2.0, &peaks, PeakShape::ColumnEfficiency, 6.0);
        assert_relative_eq!(at_apex, 1.0);

        // One sigma away: exp(-1/2)
        let one_sigma = peak_contribution(2.15, &peaks, PeakShape::ColumnEfficiency, 6.0);
        assert_relative_eq!(one_sigma, (-0.5f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_hard_cutoff() {
        let peaks = [peak(2.0, 0.1, 1.0)];
        let inside = peak_contribution(2.59, &peaks, PeakShape::ColumnEfficiency, 6.0);
        let outside = peak_contribution(2.61, &peaks, PeakShape::ColumnEfficiency, 6.0);
        assert!(inside > 0.0);
        assert_eq!(outside, 0.0);
    }

    #[test]
    fn test_proportional_shape_broadens_late_peaks() {
        let shape = PeakShape::ProportionalToRetention { k: 0.03 };
        let early = peak(1.0, 0.15, 1.0);
        let late = peak(8.0, 0.15, 1.0);
        assert!(peak_sigma(&late, shape) > peak_sigma(&early, shape));
        assert_relative_eq!(peak_sigma(&late, shape), 0.24, epsilon = 1e-12);
        assert_relative_eq!(peak_sigma(&peak(0.0, 0.15, 1.0), shape), MIN_SIGMA);
    }

    #[test]
    fn test_overlapping_peaks_add() {
        let peaks = [peak(2.0, 0.2, 1.0), peak(2.0, 0.2, 0.5)];
        let sum = peak_contribution(2.0, &peaks, PeakShape::ColumnEfficiency, 6.0);
        assert_relative_eq!(sum, 1.5);
    }

    #[test]
    fn test_noise_is_bounded() {
        let mut s = synth(SignalConfig::default());
        for _ in 0..1000 {
            let n = s.baseline_noise(2.0);
            assert!(n.abs() <= 0.02);
        }
    }

    #[test]
    fn test_saturation_clamp() {
        let mut s = synth(SignalConfig::default());
        let peaks = [peak(2.0, 0.15, 10.0)];
        let value = s.sample_at(2.0, &peaks, 1.0, DetectorRange::default());
        assert_eq!(value, 3.0);
    }

    #[test]
    fn test_same_seed_same_signal() {
        let peaks = [peak(2.0, 0.15, 1.0)];
        let mut a = synth(SignalConfig::default());
        let mut b = synth(SignalConfig::default());
        for i in 0..50 {
            let t = i as f64 * 0.05;
            assert_eq!(
                a.sample_at(t, &peaks, 1.0, DetectorRange::default()),
                b.sample_at(t, &peaks, 1.0, DetectorRange::default())
            );
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(SignalConfig::default().validate().is_ok());
        let bad = SignalConfig {
            detector_range: DetectorRange { min: 1.0, max: 1.0 },
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_detector_range_rejects_inverted_bounds() {
        assert!(DetectorRange::new(-0.3, 3.0).is_ok());
        assert!(matches!(
            DetectorRange::new(3.0, -0.3),
            Err(EngineError::InvalidParameter { field: "detector_range", .. })
        ));
        assert!(DetectorRange::new(f64::NAN, 1.0).is_err());

        // Built by hand, an inverted range still samples without panicking
        let inverted = DetectorRange { min: 3.0, max: -0.3 };
        let mut s = SignalSynthesizer::new(SignalConfig::default(), ChaCha8Rng::seed_from_u64(1));
        let value = s.sample_at(1.0, &[peak(1.0, 0.1, 1.0)], 1.0, inverted);
        assert_eq!(value, -0.3);
    }

    proptest! {
        #[test]
        fn prop_output_within_detector_range(
            t in -5.0f64..20.0,
            apex in 0.0f64..10.0,
            amplitude in 0.0f64..50.0,
            width in 0.001f64..2.0,
            sensitivity in 0.01f64..100.0,
            seed in any::<u64>(),
        ) {
            let range = DetectorRange::default();
            let mut s = SignalSynthesizer::new(SignalConfig::default(), ChaCha8Rng::seed_from_u64(seed));
            let value = s.sample_at(t, &[peak(apex, width, amplitude)], sensitivity, range);
            prop_assert!(range.contains(value));
        }
    }
}
