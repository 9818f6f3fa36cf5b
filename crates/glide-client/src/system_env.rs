//! Production Environment implementation using system time and RNG.
//!
//! - Real system time (`std::time::Instant`) that advances naturally
//! - OS randomness via getrandom for transaction ids
//! - Tokio async sleep for actual wall-clock back-off

use std::time::Duration;

use glide_core::Environment;

/// Production environment using system time and OS randomness.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. RNG failure indicates an
/// OS-level fault; there is no sensible fallback for request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
