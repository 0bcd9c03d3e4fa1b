//! HPLC Core - Simulation Engine for a Teaching Liquid Chromatograph
//!
//! This library models the three things a student watches on an HPLC:
//! 1. **Chemistry**: retention time, peak width and back-pressure from the method
//! 2. **Detector**: a noisy, saturating absorbance trace with Gaussian peaks
//! 3. **Run control**: the pump → equilibrate → inject → elute state machine
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Engine                            │
//! │  MethodParameters ─► MobilePhase / ColumnProfile           │
//! │         │                       │                          │
//! │  ┌──────▼──────┐        ┌───────▼────────┐                 │
//! │  │  chemistry  │──peaks─►  state_machine  │◄── commands    │
//! │  └─────────────┘        └───────▲────────┘                 │
//! │                                 │ tick                     │
//! │  ┌─────────────┐        ┌───────┴────────┐                 │
//! │  │   signal    │◄───────│    RunClock    │                 │
//! │  └─────────────┘        └────────────────┘                 │
//! │                 │                                          │
//! │                 ▼                                          │
//! │             EventHub ──► listeners (UI, exporter, tests)   │
//! └────────────────────────────────────────────────────────────┘
//!          ▲
//!          │ InstrumentRuntime (ctx.sleep(period) + command mailbox)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hplc_core::{Engine, EngineConfig, MethodPatch, RunPhase};
//!
//! let mut engine = Engine::new(EngineConfig::seeded(42))?;
//! engine.configure(&MethodPatch::new().organic_percent(50.0))?;
//! engine.start_pump()?;
//! while engine.phase() != RunPhase::Ready {
//!     engine.tick();
//! }
//! engine.inject()?;
//! while engine.tick().is_some() {}
//! ```

pub mod catalog;
pub mod chemistry;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow_path;
pub mod runtime;
pub mod signal;
pub mod state_machine;

// Re-export key types for convenience
pub use chemistry::{
    ChemistryConfig, ColumnProfile, ColumnType, Compound, MethodParameters, MethodPatch,
    MobilePhase, PressureReading, Sample, ScheduledPeak,
};
pub use clock::{ClockConfig, RunClock};
pub use config::EngineConfig;
pub use engine::{Engine, EngineSnapshot};
pub use error::{EngineError, Result, RuntimeError};
pub use events::{ChannelListener, EngineEvent, EngineListener, EventHub, SubscriptionId};
pub use flow_path::{check_assembly, AssemblyReport, InstrumentPart, FLOW_PATH};
pub use runtime::{Command, InstrumentHandle, InstrumentRuntime};
pub use signal::{DetectorRange, PeakShape, SamplePoint, SignalConfig, SignalSynthesizer};
pub use state_machine::{
    EquilibrationTime, InstrumentStateMachine, RunConfig, RunPhase, RunState, TransitionReason,
};
