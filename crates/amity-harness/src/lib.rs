//! Deterministic test harness for the Amity chat client.
//!
//! In-memory stand-ins for the client's collaborators, so the client and its
//! runtime can be exercised without a network:
//!
//! - [`SimEnv`]: seeded randomness on tokio's (pausable) clock
//! - [`MockRest`]: in-memory REST backend with switchable failures
//! - [`ChannelConnector`]: channel-backed links with a test-held server end
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties of a conversation that must
//! hold after every event. Use [`InvariantRegistry::standard()`] for the
//! message-list invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connector;
pub mod invariants;
pub mod mock_rest;
pub mod sim_env;

pub use connector::{ChannelConnector, ServerEnd};
pub use invariants::{
    ConfirmedNotSending, FlagsExclusive, Invariant, InvariantRegistry, InvariantResult,
    NoDuplicateMessages, UniqueTempIds, Violation,
};
pub use mock_rest::{MockRest, RestCall};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
