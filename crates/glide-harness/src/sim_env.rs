//! Simulated environment.
//!
//! Randomness comes from a seeded ChaCha RNG, so transaction ids repeat across
//! runs with the same seed. Sleeps are recorded and yield once instead of
//! waiting, which keeps retry paths fast under test while still letting tests
//! assert how much back-off the loop asked for.

use std::{
    sync::Arc,
    time::Duration,
};

use glide_core::Environment;
use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded environment for deterministic tests.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl SimEnv {
    /// Environment with the default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    /// Number of sleeps requested so far.
    pub fn sleep_count(&self) -> usize {
        self.slept.lock().len()
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.slept.lock().push(duration);
        tokio::task::yield_now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().fill_bytes(buffer);
    }
}
