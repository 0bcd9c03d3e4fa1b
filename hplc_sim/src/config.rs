//! TOML configuration loading for the harness.

use hplc_core::{EngineConfig, EngineError};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] EngineError),
}

/// Parses and validates an engine configuration.
pub fn parse_engine_config(text: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Loads an engine configuration from a TOML file.
pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_engine_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hplc_core::{EquilibrationTime, PeakShape};
    use std::io::Write;

    #[test]
    fn test_partial_toml() {
        let config = parse_engine_config(
            r#"
seed = 99
equilibration = { unit = "minutes", value = 0.5 }

[clock]
tick_period_ms = 50

[signal.peak_shape]
rule = "proportional_to_retention"
k = 0.03
"#,
        )
        .unwrap();

        assert_eq!(config.seed, 99);
        assert_eq!(config.equilibration, EquilibrationTime::Minutes(0.5));
        assert_eq!(config.clock.tick_period_ms, 50);
        assert_eq!(config.clock.dt_minutes, 0.05);
        assert_eq!(config.signal.peak_shape, PeakShape::ProportionalToRetention { k: 0.03 });
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = parse_engine_config("[chemistry]\nmax_pressure = -5.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(EngineError::InvalidParameter { .. })));

        let err = parse_engine_config("seed = \"abc\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "injection_lead = 0.1").unwrap();
        let config = load_engine_config(file.path()).unwrap();
        assert_eq!(config.injection_lead, 0.1);

        let err = load_engine_config("/nonexistent/hplc.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
