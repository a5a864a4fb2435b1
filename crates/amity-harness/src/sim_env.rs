//! Deterministic environment for simulation tests.
//!
//! Time comes from tokio's clock, so under a paused runtime
//! (`#[tokio::test(start_paused = true)]`) it only moves when every task is
//! idle or when a test advances it. Randomness comes from a seeded ChaCha
//! stream, so temp ids repeat across runs with the same seed.

#![allow(clippy::disallowed_types, reason = "Synchronous locking of RNG state only")]

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use amity_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

/// Wall-clock time the simulation starts at (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Seeded environment on tokio time.
#[derive(Clone)]
pub struct SimEnv {
    start: Instant,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("start", &self.start).finish_non_exhaustive()
    }
}

impl SimEnv {
    /// Create an environment whose randomness is derived from `seed`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_seed(seed: u64) -> Self {
        Self { start: Instant::now(), rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.start
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SIM_EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
