//! Chat message model.
//!
//! A [`Message`] is the same shape whether it came back from a REST call,
//! arrived as a realtime push, or was built locally as an optimistic insert.
//! The transient `sending` and `failed` flags never travel on the wire.

use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, TempId, UserId};

/// Kind of attached media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Audio recording (voice note).
    Audio,
    /// Any other file.
    Document,
}

impl MediaKind {
    /// Classify a MIME type the way the upload service does.
    pub fn from_mime(mime: &str) -> Self {
        let top = mime.split('/').next().unwrap_or_default();
        match top {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            _ => Self::Document,
        }
    }
}

/// Hosted media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Public URL of the uploaded file.
    pub url: String,
    /// Detected media kind.
    pub kind: MediaKind,
}

/// One chat message.
///
/// # Invariants
///
/// - A message built locally has `temp_id = Some(..)` and `id = None` until
///   the server confirms it.
/// - `sending` and `failed` are never both set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id. `None` while the message is only local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Client-generated id, echoed back by the server when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,

    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,

    /// Author.
    pub sender_id: UserId,

    /// Text body. Empty for media-only messages.
    #[serde(default)]
    pub content: String,

    /// Optional attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,

    /// Creation time in Unix milliseconds (UTC).
    pub created_at: u64,

    /// Whether the recipient has read the message.
    #[serde(default)]
    pub read: bool,

    /// Optimistic insert not yet confirmed by the server.
    #[serde(skip)]
    pub sending: bool,

    /// Send failed; kept visible so the user can retry or discard it.
    #[serde(skip)]
    pub failed: bool,
}

impl Message {
    /// Build an optimistic local message in `sending` state.
    pub fn pending(
        temp_id: TempId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        media: Option<MediaRef>,
        created_at: u64,
    ) -> Self {
        Self {
            id: None,
            temp_id: Some(temp_id),
            conversation_id,
            sender_id,
            content,
            media,
            created_at,
            read: false,
            sending: true,
            failed: false,
        }
    }

    /// Whether the server has assigned this message an id.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }

    /// Whether `user` is the author.
    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }
}
