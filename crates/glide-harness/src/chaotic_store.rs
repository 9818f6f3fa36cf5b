//! Chaotic snapshot store for fault injection.
//!
//! Wraps a real [`SessionStore`] and fails operations at a configured rate.
//! The sync loop must treat store failures as non-fatal, so a session over a
//! `ChaoticStore` keeps syncing no matter how often persistence fails.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use glide_client::{SessionStore, StoreError};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Store wrapper that randomly fails.
///
/// Clones share the RNG and counters.
#[derive(Clone)]
pub struct ChaoticStore<S: SessionStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaCha8Rng>>,
    operations: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl<S: SessionStore> ChaoticStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            operations: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking what survived the chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Operations that were made to fail.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn roll(&self, op: &'static str) -> Result<(), StoreError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.rng.lock().gen_bool(self.failure_rate) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Io(format!("chaotic failure injection ({op})")));
        }
        Ok(())
    }
}

impl<S: SessionStore> SessionStore for ChaoticStore<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.roll("load")?;
        self.inner.load(key)
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.roll("save")?;
        self.inner.save(key, bytes)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.roll("clear")?;
        self.inner.clear(key)
    }
}

#[cfg(test)]
mod tests {
    use glide_client::MemoryStore;

    use super::*;

    #[test]
    fn never_and_always() {
        let calm = ChaoticStore::new(MemoryStore::new(), 0.0);
        for _ in 0..50 {
            calm.save("k", b"v").unwrap();
        }
        assert_eq!(calm.failure_count(), 0);

        let broken = ChaoticStore::new(MemoryStore::new(), 1.0);
        assert!(matches!(broken.save("k", b"v"), Err(StoreError::Io(_))));
        assert!(broken.inner().is_empty());
        assert_eq!(broken.operation_count(), 1);
    }

    #[test]
    fn failed_save_leaves_previous_value() {
        let store = ChaoticStore::with_seed(MemoryStore::new(), 0.5, 9);
        let mut last_saved = None;
        for i in 0u8..100 {
            if store.save("k", &[i]).is_ok() {
                last_saved = Some(vec![i]);
            }
        }
        assert!(store.failure_count() > 0);
        assert_eq!(store.inner().load("k").unwrap(), last_saved);
    }

    #[test]
    #[should_panic(expected = "failure_rate")]
    fn rejects_bad_rate() {
        let _ = ChaoticStore::new(MemoryStore::new(), 1.5);
    }
}
