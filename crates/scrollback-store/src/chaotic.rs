//! Chaotic store wrapper for fault injection testing
//!
//! Randomly fails operations so the tracker and session can be tested against
//! storage that misbehaves.

use std::sync::{Arc, Mutex};

use scrollback_core::{ConversationKey, ReadPosition};

use super::{ReadPositionStore, StoreError};

/// Store wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations based on a configured
/// failure rate. A failed operation never reaches the inner store, so a failed
/// write leaves the previous value intact.
#[derive(Clone)]
pub struct ChaoticStore<S: ReadPositionStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Failures injected so far
    injected: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos runs are reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: ReadPositionStore> ChaoticStore<S> {
    /// Wrap `inner` with a fixed seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
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
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            injected: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store (for checking state after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of failures injected so far.
    pub fn injected(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.injected.lock().expect("injected mutex poisoned")
    }

    fn chaos(&self, operation: &'static str) -> Result<(), StoreError> {
        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;
        if fail {
            #[allow(clippy::expect_used)]
            let mut injected = self.injected.lock().expect("injected mutex poisoned");
            *injected += 1;
            return Err(StoreError::Injected { operation });
        }
        Ok(())
    }
}

impl<S: ReadPositionStore> ReadPositionStore for ChaoticStore<S> {
    fn load(&self, key: &ConversationKey) -> Result<Option<ReadPosition>, StoreError> {
        self.chaos("load")?;
        self.inner.load(key)
    }

    fn save(&self, key: &ConversationKey, position: &ReadPosition) -> Result<(), StoreError> {
        self.chaos("save")?;
        self.inner.save(key, position)
    }

    fn remove(&self, key: &ConversationKey) -> Result<(), StoreError> {
        self.chaos("remove")?;
        self.inner.remove(key)
    }

    fn list(&self) -> Result<Vec<(ConversationKey, ReadPosition)>, StoreError> {
        self.chaos("list")?;
        self.inner.list()
    }
}
