//! HPLC Deterministic Simulation Harness
//!
//! This crate drives the HPLC engine in a controlled environment where
//! every run is reproducible from a single 64-bit seed.
//!
//! # Core Principle: The External Scheduler
//!
//! The engine never reads a clock and never draws entropy on its own:
//! - **Time**: a virtual clock ([`SimContext`]) that moves only when slept on
//! - **Randomness**: detector noise is a ChaCha8 stream derived from the seed
//! - **Pacing**: either a plain tick loop ([`ScenarioRunner`]) or the async
//!   [`InstrumentRuntime`](hplc_core::InstrumentRuntime) ([`live::run_live`])
//!
//! # Usage
//!
//! ```ignore
//! use hplc_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::MixtureRun);
//! assert!(result.passed);
//! ```

mod context;
pub mod config;
pub mod exporter;
pub mod live;
pub mod runner;
pub mod scenarios;

pub use config::{load_engine_config, ConfigError};
pub use context::SimContext;
pub use exporter::{PeakRecord, RunExport};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
