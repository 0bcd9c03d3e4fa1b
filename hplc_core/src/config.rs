//! Engine configuration.
//!
//! Every tunable constant of the model lives here. All sections default, so
//! a partial TOML/JSON document is enough:
//!
//! ```toml
//! seed = 42
//! injection_lead = 0.05
//! equilibration = { unit = "ticks", value = 5 }
//!
//! [clock]
//! dt_minutes = 0.05
//! tick_period_ms = 100
//!
//! [chemistry]
//! max_pressure = 400.0
//!
//! [signal.peak_shape]
//! rule = "proportional_to_retention"
//! k = 0.03
//! ```

use crate::chemistry::ChemistryConfig;
use crate::clock::ClockConfig;
use crate::error::{EngineError, Result};
use crate::signal::SignalConfig;
use crate::state_machine::{EquilibrationTime, RunConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Noise RNG seed. 0 draws from entropy.
    pub seed: u64,

    pub clock: ClockConfig,

    pub equilibration: EquilibrationTime,

    /// INJECTED becomes RUNNING this long before the first apex (min)
    pub injection_lead: f64,

    pub chemistry: ChemistryConfig,

    pub signal: SignalConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            clock: ClockConfig::default(),
            equilibration: EquilibrationTime::default(),
            injection_lead: 0.05,
            chemistry: ChemistryConfig::default(),
            signal: SignalConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Timing rules handed to the state machine.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            equilibration: self.equilibration,
            injection_lead: self.injection_lead,
            max_time: self.clock.max_time_minutes,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.clock.validate()?;
        self.run_config().validate()?;
        self.chemistry.validate()?;
        self.signal.validate()?;
        if self.clock.tick_period_ms == 0 {
            return Err(EngineError::invalid_parameter("tick_period_ms", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::PeakShape;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run_config().max_time, 10.0);
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"seed": 9, "equilibration": {"unit": "minutes", "value": 0.5},
                "signal": {"peak_shape": {"rule": "proportional_to_retention", "k": 0.03}}}"#,
        )
        .unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.equilibration, EquilibrationTime::Minutes(0.5));
        assert_eq!(config.signal.peak_shape, PeakShape::ProportionalToRetention { k: 0.03 });
        assert_eq!(config.clock, ClockConfig::default());
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let mut config = EngineConfig::default();
        config.clock.dt_minutes = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.injection_lead = -1.0;
        assert!(config.validate().is_err());
    }
}
