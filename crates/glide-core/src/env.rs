//! Environment abstraction for deterministic testing.
//!
//! Decouples the sync loop from system resources (time, randomness). The
//! engine itself never reads the clock; only drivers do, through this trait,
//! so simulations can substitute a seeded RNG and skip real back-off sleeps.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - Given the same seed, a simulated environment produces the same sequence
///   of random values
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulations may use a
    /// virtual clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only drivers call this (retry back-off); the engine never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Fresh transaction id for the next request, as lowercase hex.
    fn transaction_id(&self) -> String {
        format!("{:016x}", self.random_u64())
    }
}
