//! Amity wire protocol
//!
//! Typed vocabulary for the realtime channel between a chat client and the
//! Amity server. Every event that crosses the socket is a variant of a closed
//! tagged union: [`ClientFrame`] for what the client emits and
//! [`ServerEvent`] for what it receives. Payloads are CBOR, adjacently tagged
//! as `{ "event": <kebab-case name>, "data": <payload> }`.
//!
//! # Components
//!
//! - [`ids`]: Newtype identifiers (conversation, user, message, temp id)
//! - [`Message`]: Chat message model shared by REST and realtime paths
//! - [`ClientFrame`] / [`ServerEvent`]: Outgoing and inbound events
//! - [`EventKind`]: Payload-free tag used for subscription routing

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod event;
pub mod ids;
pub mod message;

pub use errors::{ProtocolError, Result};
pub use event::{ClientFrame, EventKind, MAX_FRAME_SIZE, OutgoingMessage, ServerEvent};
pub use ids::{ConversationId, MessageId, TempId, UserId};
pub use message::{MediaKind, MediaRef, Message};
