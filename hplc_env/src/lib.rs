//! HPLC Environment Abstraction Layer
//!
//! This crate provides the abstraction allowing the HPLC engine to be driven
//! either by the **wall clock** (tokio) or by a **virtual clock** (simulation).
//!
//! # Core Concept: The External Scheduler
//!
//! The engine itself never sleeps and never reads the clock. Everything that
//! would make a run non-reproducible is routed through an [`InstrumentContext`]:
//! - Time (`now()`, `sleep()`)
//! - Randomness (`derive_rng()`, used for detector baseline noise)
//!
//! A simulation context derives all entropy from a single 64-bit seed, so any
//! chromatogram can be reproduced from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use hplc_env::InstrumentContext;
//!
//! async fn drive<Ctx: InstrumentContext>(ctx: &Ctx, engine: &mut Engine) {
//!     while engine.is_ticking() {
//!         ctx.sleep(Duration::from_millis(100)).await;
//!         engine.tick();
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::InstrumentContext;
pub use types::InstrumentId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
