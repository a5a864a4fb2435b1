//! Realtime event vocabulary.
//!
//! One variant per event that crosses the socket. The enum tag is the event
//! name; there is no free-form string routing anywhere above this module.
//!
//! # Wire format
//!
//! ```text
//! { "event": "send-message", "data": { "temp_id": .., "conversation_id": .., .. } }
//! ```
//!
//! encoded as CBOR in a single binary socket message.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    errors::{ProtocolError, Result},
    ids::{ConversationId, TempId, UserId},
    message::{MediaRef, Message},
};

/// Maximum encoded size of a single frame in either direction (1 MiB).
///
/// Media travels through the REST upload path, so realtime frames only carry
/// text and references.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Payload of an optimistic realtime send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Client-generated id the server echoes back.
    pub temp_id: TempId,
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Text body.
    pub content: String,
    /// Already-uploaded attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Enter a conversation room.
    JoinConversation {
        /// Room to enter.
        conversation_id: ConversationId,
    },

    /// Exit a conversation room.
    LeaveConversation {
        /// Room to exit.
        conversation_id: ConversationId,
    },

    /// Optimistic send; the durable copy goes through REST.
    SendMessage(OutgoingMessage),

    /// Local typing state changed.
    Typing {
        /// Conversation being composed in.
        conversation_id: ConversationId,
        /// `true` on first keystroke, `false` after the idle window.
        is_typing: bool,
    },

    /// Everything in the conversation has been read by this client.
    MarkRead {
        /// Conversation that was read.
        conversation_id: ConversationId,
    },
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A message was stored. May be our own message echoed back.
    NewMessage(Message),

    /// The server accepted a realtime send and is processing it.
    MessageSendingAck {
        /// Temp id from the originating [`ClientFrame::SendMessage`].
        temp_id: TempId,
    },

    /// The server rejected a realtime send.
    MessageError {
        /// Temp id from the originating [`ClientFrame::SendMessage`].
        temp_id: TempId,
        /// Human-readable reason.
        error: String,
    },

    /// A participant read the conversation.
    MessageRead {
        /// Conversation that was read.
        conversation_id: ConversationId,
        /// Reader.
        read_by: UserId,
    },

    /// A participant started or stopped typing.
    UserTyping {
        /// Who is typing.
        user_id: UserId,
        /// Where.
        conversation_id: ConversationId,
        /// New state.
        is_typing: bool,
    },

    /// A user went online or offline.
    UserStatus {
        /// Whose status changed.
        user_id: UserId,
        /// New state.
        is_online: bool,
    },
}

/// Payload-free event tag used as a subscription key.
///
/// Covers every [`ServerEvent`] variant plus the three connection lifecycle
/// events that are raised locally rather than received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Transport connected (local).
    Connect,
    /// Transport dropped or was closed (local).
    Disconnect,
    /// Reconnection attempts exhausted (local).
    ReconnectFailed,
    /// [`ServerEvent::NewMessage`].
    NewMessage,
    /// [`ServerEvent::MessageSendingAck`].
    MessageSendingAck,
    /// [`ServerEvent::MessageError`].
    MessageError,
    /// [`ServerEvent::MessageRead`].
    MessageRead,
    /// [`ServerEvent::UserTyping`].
    UserTyping,
    /// [`ServerEvent::UserStatus`].
    UserStatus,
}

impl ClientFrame {
    /// Conversation the frame targets.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::Typing { conversation_id, .. }
            | Self::MarkRead { conversation_id } => conversation_id,
            Self::SendMessage(msg) => &msg.conversation_id,
        }
    }

    /// Encode as a CBOR frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Decode a CBOR frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl ServerEvent {
    /// Subscription tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::MessageSendingAck { .. } => EventKind::MessageSendingAck,
            Self::MessageError { .. } => EventKind::MessageError,
            Self::MessageRead { .. } => EventKind::MessageRead,
            Self::UserTyping { .. } => EventKind::UserTyping,
            Self::UserStatus { .. } => EventKind::UserStatus,
        }
    }

    /// Conversation the event is scoped to. `None` for events that are not
    /// tied to one room (acks, errors, presence).
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::NewMessage(msg) => Some(&msg.conversation_id),
            Self::MessageRead { conversation_id, .. }
            | Self::UserTyping { conversation_id, .. } => Some(conversation_id),
            Self::MessageSendingAck { .. } | Self::MessageError { .. } | Self::UserStatus { .. } => {
                None
            },
        }
    }

    /// Encode as a CBOR frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    /// Decode a CBOR frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    if buf.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: buf.len(), max: MAX_FRAME_SIZE });
    }
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: bytes.len(), max: MAX_FRAME_SIZE });
    }
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::MediaKind;

    fn sample_message() -> Message {
        Message {
            id: Some("m1".into()),
            temp_id: Some("temp-1".into()),
            conversation_id: "c1".into(),
            sender_id: "bob".into(),
            content: "hey".into(),
            media: Some(MediaRef { url: "https://cdn/x.jpg".into(), kind: MediaKind::Image }),
            created_at: 1_700_000_000_000,
            read: false,
            sending: false,
            failed: false,
        }
    }

    #[test]
    fn new_message_survives_codec() {
        let event = ServerEvent::NewMessage(sample_message());
        let bytes = event.encode().unwrap();

        assert_eq!(ServerEvent::decode(&bytes).unwrap(), event);
    }

    #[test]
    fn transient_flags_are_not_transmitted() {
        let mut msg = sample_message();
        msg.sending = true;
        let bytes = ServerEvent::NewMessage(msg).encode().unwrap();

        let ServerEvent::NewMessage(decoded) = ServerEvent::decode(&bytes).unwrap() else {
            panic!("wrong variant");
        };
        assert!(!decoded.sending);
    }

    #[test]
    fn garbage_is_rejected() {
        let result = ServerEvent::decode(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn oversized_frame_is_rejected_before_parsing() {
        let bytes = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            ClientFrame::decode(&bytes),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_outgoing_message_is_rejected() {
        let frame = ClientFrame::SendMessage(OutgoingMessage {
            temp_id: "temp-1".into(),
            conversation_id: "c1".into(),
            content: "x".repeat(MAX_FRAME_SIZE),
            media: None,
        });
        assert!(matches!(frame.encode(), Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn scope_of_server_events() {
        let read = ServerEvent::MessageRead { conversation_id: "c1".into(), read_by: "bob".into() };
        let status = ServerEvent::UserStatus { user_id: "bob".into(), is_online: true };

        assert_eq!(read.conversation_id(), Some(&ConversationId::new("c1")));
        assert_eq!(read.kind(), EventKind::MessageRead);
        assert_eq!(status.conversation_id(), None);
    }

    #[test]
    fn client_frame_decodes_from_server_side() {
        let frame = ClientFrame::Typing { conversation_id: "c1".into(), is_typing: true };
        let bytes = frame.encode().unwrap();

        assert_eq!(ClientFrame::decode(&bytes).unwrap(), frame);
    }
}
