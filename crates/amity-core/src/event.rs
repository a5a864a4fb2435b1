//! Inbound events as seen by subscribers.

use amity_proto::{ConversationId, EventKind, ServerEvent};

/// Everything the transport layer can report upward: server pushes plus the
/// locally raised connection lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport connected and authenticated.
    Connected,

    /// Transport dropped or was closed.
    Disconnected {
        /// Why the transport went down.
        reason: String,
    },

    /// Reconnection gave up.
    ReconnectFailed {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Event pushed by the server.
    Server(ServerEvent),
}

impl TransportEvent {
    /// Subscription tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connect,
            Self::Disconnected { .. } => EventKind::Disconnect,
            Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            Self::Server(event) => event.kind(),
        }
    }

    /// Conversation the event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::Server(event) => event.conversation_id(),
            Self::Connected | Self::Disconnected { .. } | Self::ReconnectFailed { .. } => None,
        }
    }
}

impl From<ServerEvent> for TransportEvent {
    fn from(event: ServerEvent) -> Self {
        Self::Server(event)
    }
}
