//! Environment backed by the OS clocks and RNG.
//!
//! `SystemEnv` uses real monotonic time for timers, the system clock for
//! message timestamps, and OS randomness for temp id nonces. Behavior is
//! non-deterministic; tests use `MockEnv` or the harness `SimEnv` instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use amity_core::Environment;

/// The environment real clients run in.
///
/// # Panics
///
/// Panics if the OS RNG fails. Temp ids would collide without it, and RNG
/// failure indicates an OS-level fault the client cannot recover from.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Construct the environment. Stateless, so clones are free.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn unix_millis(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
