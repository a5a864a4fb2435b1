//! Amity core
//!
//! Pure state machines for the realtime half of the chat client. Nothing in
//! this crate performs I/O: methods take time as input and return actions for
//! a driver to execute, so the same logic runs under a real socket and under
//! a simulated clock.
//!
//! # Components
//!
//! - [`Connection`]: connect/reconnect lifecycle with a bounded retry policy
//! - [`ChannelRegistry`]: idempotent conversation room membership
//! - [`EventDispatcher`]: scoped fan-out of inbound events to subscribers
//! - [`identify`]: message identity rule used for deduplication
//! - [`Environment`]: time and randomness abstraction

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod dispatcher;
pub mod env;
pub mod error;
pub mod event;
pub mod identify;
pub mod registry;

pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionState, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_DELAY,
};
pub use dispatcher::{EventDispatcher, Scope, SubscriptionId};
pub use env::Environment;
pub use error::ConnectionError;
pub use event::TransportEvent;
pub use identify::{FUZZY_MATCH_WINDOW_MS, Identity, find_match, identify};
pub use registry::ChannelRegistry;
