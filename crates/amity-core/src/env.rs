//! Environment abstraction for deterministic testing.
//!
//! Decouples client logic from system resources (time, randomness). Tests
//! drive a manual clock; production uses the system clock and OS entropy.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `unix_millis()` is wall-clock time and is only used for message
///   timestamps, never for timers
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type. `std::time::Instant` in production, virtual
    /// time in simulation.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time in Unix milliseconds (UTC).
    fn unix_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines take time as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }
}

/// Test environments.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    #![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

    use std::{
        ops::Sub,
        sync::{Arc, Mutex, PoisonError},
        time::Duration,
    };

    use super::Environment;

    /// Virtual instant measured from the start of the test.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct MockInstant(pub Duration);

    impl Sub for MockInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            self.0.saturating_sub(rhs.0)
        }
    }

    #[derive(Debug)]
    struct MockState {
        elapsed: Duration,
        epoch_millis: u64,
        counter: u8,
    }

    /// Environment with a manually advanced clock and predictable bytes.
    ///
    /// Clones share the same clock, so a test can hold one handle while the
    /// client under test holds another.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        state: Arc<Mutex<MockState>>,
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEnv {
        /// Wall-clock time the mock starts at (2023-11-14T22:13:20Z).
        pub const START_MILLIS: u64 = 1_700_000_000_000;

        /// Create a mock environment at [`Self::START_MILLIS`].
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    elapsed: Duration::ZERO,
                    epoch_millis: Self::START_MILLIS,
                    counter: 0,
                })),
            }
        }

        /// Move both clocks forward.
        pub fn advance(&self, by: Duration) {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.elapsed += by;
        }

        fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state)
        }
    }

    impl Environment for MockEnv {
        type Instant = MockInstant;

        fn now(&self) -> MockInstant {
            self.with_state(|s| MockInstant(s.elapsed))
        }

        fn unix_millis(&self) -> u64 {
            self.with_state(|s| s.epoch_millis + s.elapsed.as_millis() as u64)
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.with_state(|s| {
                for byte in buffer.iter_mut() {
                    s.counter = s.counter.wrapping_add(1);
                    *byte = s.counter;
                }
            });
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn clones_share_clock() {
            let env = MockEnv::new();
            let other = env.clone();

            env.advance(Duration::from_secs(3));

            assert_eq!(other.now(), MockInstant(Duration::from_secs(3)));
            assert_eq!(other.unix_millis(), MockEnv::START_MILLIS + 3_000);
        }

        #[test]
        fn random_values_differ() {
            let env = MockEnv::new();
            assert_ne!(env.random_u32(), env.random_u32());
        }
    }
}
