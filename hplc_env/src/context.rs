//! Core environment context trait for driving an instrument engine.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// What an instrument needs from its surroundings: a clock to pace
/// ticks against and a source of detector noise.
///
/// - `TokioContext`: wall clock, entropy-seeded noise (classroom demo)
/// - `SimContext` (in `hplc_sim`): virtual clock, `ChaCha8Rng(seed)` noise
///
/// A run driven through a seeded context produces the same chromatogram
/// every time.
#[async_trait]
pub trait InstrumentContext: Send + Sync + 'static {
    /// Time elapsed since the context was created (virtual in simulation).
    fn now(&self) -> Duration;
    
    /// Waits until the next tick is due. A virtual clock just jumps forward.
    async fn sleep(&self, duration: Duration);
    
    /// Noise stream for one consumer. Distinct `stream` values give
    /// independent sequences from the same master seed.
    fn derive_rng(&self, stream: u64) -> ChaCha8Rng;
    
    /// Master seed recorded in exports; 0 when noise comes from entropy.
    fn seed(&self) -> u64;
}
