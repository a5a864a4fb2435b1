//! In-memory REST backend.
//!
//! Stores history per conversation, assigns ids on send, paginates newest
//! first with an exclusive `before` cursor, and records every call. Failures
//! are switched on per operation so tests can exercise error paths.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use amity_client::{
    Attachment, MatchSummary, MediaKind, MediaRef, MessagePage, RestApi, RestError,
};
use amity_proto::{ConversationId, Message, MessageId, UserId};

use crate::sim_env::SIM_EPOCH_MILLIS;

/// A call received by [`MockRest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestCall {
    /// `fetch_messages`.
    FetchMessages {
        /// Conversation.
        conversation_id: ConversationId,
        /// Page number.
        page: u32,
        /// Cursor.
        before: Option<MessageId>,
    },
    /// `send_message`.
    SendMessage {
        /// Conversation.
        conversation_id: ConversationId,
        /// Text body.
        content: String,
    },
    /// `mark_read`.
    MarkRead {
        /// Message.
        message_id: MessageId,
    },
    /// `mark_all_read`.
    MarkAllRead {
        /// Conversation.
        conversation_id: ConversationId,
    },
    /// `upload_media`.
    UploadMedia {
        /// MIME type of the upload.
        mime: String,
    },
    /// `fetch_match`.
    FetchMatch {
        /// Conversation.
        conversation_id: ConversationId,
    },
}

#[derive(Debug, Default)]
struct State {
    history: HashMap<ConversationId, Vec<Message>>,
    matches: HashMap<ConversationId, MatchSummary>,
    next_id: u64,
    fail_sends: bool,
    fail_uploads: bool,
    failing_fetches: u32,
    calls: Vec<RestCall>,
}

/// In-memory [`RestApi`] acting as `sender`.
#[derive(Debug, Clone)]
pub struct MockRest {
    sender: UserId,
    state: Arc<Mutex<State>>,
}

impl MockRest {
    /// Create a backend whose sends are authored by `sender`.
    pub fn new(sender: impl Into<UserId>) -> Self {
        Self { sender: sender.into(), state: Arc::new(Mutex::new(State::default())) }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Append stored messages, oldest first.
    pub fn seed(&self, messages: impl IntoIterator<Item = Message>) {
        self.with_state(|s| {
            for message in messages {
                s.history.entry(message.conversation_id.clone()).or_default().push(message);
            }
        });
    }

    /// Register the counterpart summary for a conversation.
    pub fn add_match(&self, summary: MatchSummary) {
        self.with_state(|s| s.matches.insert(summary.conversation_id.clone(), summary));
    }

    /// Make every send fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.with_state(|s| s.fail_sends = fail);
    }

    /// Make every upload fail (or succeed again).
    pub fn set_fail_uploads(&self, fail: bool) {
        self.with_state(|s| s.fail_uploads = fail);
    }

    /// Fail the next `count` history fetches.
    pub fn fail_next_fetches(&self, count: u32) {
        self.with_state(|s| s.failing_fetches = count);
    }

    /// Every call so far, in arrival order.
    pub fn calls(&self) -> Vec<RestCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Stored history of a conversation, oldest first.
    pub fn stored(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.with_state(|s| s.history.get(conversation_id).cloned().unwrap_or_default())
    }

    /// Build a stored message with a fresh id. Not persisted.
    pub fn message_from(
        &self,
        conversation_id: &ConversationId,
        sender: impl Into<UserId>,
        content: &str,
    ) -> Message {
        self.with_state(|s| new_message(s, conversation_id, sender.into(), content, None))
    }
}

fn new_message(
    state: &mut State,
    conversation_id: &ConversationId,
    sender_id: UserId,
    content: &str,
    media: Option<MediaRef>,
) -> Message {
    state.next_id += 1;
    Message {
        id: Some(MessageId::new(format!("m{}", state.next_id))),
        temp_id: None,
        conversation_id: conversation_id.clone(),
        sender_id,
        content: content.to_string(),
        media,
        created_at: SIM_EPOCH_MILLIS + state.next_id * 100,
        read: false,
        sending: false,
        failed: false,
    }
}

fn unavailable() -> RestError {
    RestError::Status { code: 503, message: "service unavailable".to_string() }
}

impl RestApi for MockRest {
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<MessagePage, RestError> {
        self.with_state(|s| {
            s.calls.push(RestCall::FetchMessages {
                conversation_id: conversation_id.clone(),
                page,
                before: before.cloned(),
            });
            if s.failing_fetches > 0 {
                s.failing_fetches -= 1;
                return Err(unavailable());
            }

            let all = s.history.get(conversation_id).map(Vec::as_slice).unwrap_or_default();
            let end = before
                .and_then(|id| all.iter().position(|m| m.id.as_ref() == Some(id)))
                .unwrap_or(all.len());
            let limit = limit.max(1) as usize;
            let older = &all[..end];
            let start = older.len().saturating_sub(limit);

            Ok(MessagePage {
                messages: older[start..].iter().rev().cloned().collect(),
                page,
                total_pages: all.len().div_ceil(limit) as u32,
            })
        })
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        media: Option<&MediaRef>,
    ) -> Result<Message, RestError> {
        self.with_state(|s| {
            s.calls.push(RestCall::SendMessage {
                conversation_id: conversation_id.clone(),
                content: content.to_string(),
            });
            if s.fail_sends {
                return Err(unavailable());
            }

            let message =
                new_message(s, conversation_id, self.sender.clone(), content, media.cloned());
            s.history.entry(conversation_id.clone()).or_default().push(message.clone());
            Ok(message)
        })
    }

    async fn mark_read(&self, message_id: &MessageId) -> Result<(), RestError> {
        self.with_state(|s| {
            s.calls.push(RestCall::MarkRead { message_id: message_id.clone() });
            for message in s.history.values_mut().flatten() {
                if message.id.as_ref() == Some(message_id) {
                    message.read = true;
                }
            }
            Ok(())
        })
    }

    async fn mark_all_read(&self, conversation_id: &ConversationId) -> Result<(), RestError> {
        let reader = self.sender.clone();
        self.with_state(|s| {
            s.calls.push(RestCall::MarkAllRead { conversation_id: conversation_id.clone() });
            if let Some(history) = s.history.get_mut(conversation_id) {
                for message in history.iter_mut().filter(|m| m.sender_id != reader) {
                    message.read = true;
                }
            }
            Ok(())
        })
    }

    async fn upload_media(&self, attachment: &Attachment) -> Result<MediaRef, RestError> {
        self.with_state(|s| {
            s.calls.push(RestCall::UploadMedia { mime: attachment.mime.clone() });
            if s.fail_uploads {
                return Err(RestError::Status { code: 413, message: "too large".to_string() });
            }
            s.next_id += 1;
            Ok(MediaRef {
                url: format!("https://media.test/{}", s.next_id),
                kind: MediaKind::from_mime(&attachment.mime),
            })
        })
    }

    async fn fetch_match(&self, conversation_id: &ConversationId) -> Result<MatchSummary, RestError> {
        self.with_state(|s| {
            s.calls.push(RestCall::FetchMatch { conversation_id: conversation_id.clone() });
            s.matches.get(conversation_id).cloned().ok_or_else(|| RestError::Status {
                code: 404,
                message: "match not found".to_string(),
            })
        })
    }
}
