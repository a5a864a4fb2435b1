//! Client
//!
//! Action-based chat client for Amity. Owns the realtime connection policy,
//! room membership, and the reconciliation of each open conversation's
//! message list from three independent sources: optimistic local sends, REST
//! responses, and realtime pushes.
//!
//! # Architecture
//!
//! The [`Client`] follows the Sans-IO and Action-Based patterns of
//! [`amity_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute. REST results come back in as
//! [`ClientEvent::RestCompleted`], so every await point of a real driver is
//! an explicit event boundary here.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine (connection, rooms, presence)
//! - [`Conversation`]: Message reconciler for the open conversation
//! - [`TypingSignaler`] / [`RemoteTyping`]: Typing indicators
//! - [`receipts`]: Read-receipt application
//! - [`RestApi`]: Durable request/response collaborator
//! - [`Runtime`]: Async driver wiring a [`Connector`] and a [`RestApi`]
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::WsConnector`]: WebSocket connector with bearer auth

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod conversation;
mod error;
mod event;
mod presence;
pub mod receipts;
mod rest;
mod runtime;
mod session;
mod system_env;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use amity_core::{
    ConnectionState, Environment, EventDispatcher, Scope, SubscriptionId, TransportEvent,
};
pub use amity_proto::{ConversationId, EventKind, MediaKind, MediaRef, Message, MessageId, TempId, UserId};
pub use client::{Client, ClientIdentity};
pub use config::{ClientConfig, DEFAULT_PAGE_SIZE, DEFAULT_TICK_INTERVAL};
pub use conversation::{Conversation, ConversationPhase, ConversationSnapshot};
pub use error::{ClientError, RestError, RuntimeError, SessionError, TransportError};
pub use event::{Attachment, ClientAction, ClientEvent, RestRequest, RestResponse};
pub use presence::Presence;
pub use rest::{MatchSummary, MessagePage, RestApi, execute};
pub use runtime::{Command, Connector, Handle, LINK_BUFFER, Link, Runtime};
pub use session::{AuthSession, ProfileSummary, SessionUser};
pub use system_env::SystemEnv;
pub use typing::{DEFAULT_TYPING_IDLE, RemoteTyping, TypingSignaler};
