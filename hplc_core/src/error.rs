//! Error taxonomy for the HPLC engine.

use crate::state_machine::RunPhase;
use hplc_env::EnvError;
use thiserror::Error;

/// Errors reported by engine operations.
///
/// None of these are fatal: every one is recoverable by user action
/// (stop, reconfigure, restart).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Operation not allowed in the current phase. Engine state is unchanged.
    #[error("Invalid state: cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: RunPhase,
    },

    /// Out-of-range configuration value. No part of the patch was applied.
    #[error("Invalid parameter `{field}`: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    /// Modeled back-pressure exceeds the ceiling; the instrument is in ERROR.
    #[error("Over-pressure: {bar:.0} bar exceeds limit of {max:.0} bar")]
    OverPressure { bar: f64, max: f64 },

    /// Sample id not present in the compound catalog.
    #[error("Unknown sample: {0}")]
    UnknownSample(String),
}

impl EngineError {
    /// Creates an invalid-state error.
    pub fn invalid_state(operation: &'static str, phase: RunPhase) -> Self {
        Self::InvalidState { operation, phase }
    }

    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced through an [`InstrumentHandle`](crate::runtime::InstrumentHandle).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = EngineError::invalid_state("inject", RunPhase::Pumping);
        assert_eq!(err.to_string(), "Invalid state: cannot inject while PUMPING");

        let err = EngineError::invalid_parameter("flow_rate", "must be > 0");
        assert_eq!(err.to_string(), "Invalid parameter `flow_rate`: must be > 0");

        let err = EngineError::OverPressure { bar: 451.2, max: 400.0 };
        assert_eq!(err.to_string(), "Over-pressure: 451 bar exceeds limit of 400 bar");
    }
}
