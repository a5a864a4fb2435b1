//! Conversation reconciler.
//!
//! Owns the message list of the open conversation and merges three sources
//! into it: optimistic local sends, REST responses, and realtime pushes.
//! After every merge the list holds at most one entry per logical message,
//! as decided by [`amity_core::identify`].
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ open ┌─────────┐ page ┌───────┐ load_more ┌─────────────┐
//! │ Idle │ ───> │ Loading │ ───> │ Ready │ ────────> │ LoadingMore │
//! └──────┘      └─────────┘      └───────┘ <──────── └─────────────┘
//!                 ↑    │ error               page or error
//!       retry_load│    ↓
//!               ┌────────────┐
//!               │ LoadFailed │
//!               └────────────┘
//! ```
//!
//! Live pushes and sends are accepted in every phase except `Idle`.
//!
//! # Ordering
//!
//! Sends and live messages are appended at the tail. Older pages are
//! prepended without re-sorting, so the list stays in creation order as long
//! as each fetched page is strictly older than the current head.

use std::{
    collections::HashSet,
    ops::Sub,
    time::Duration,
};

use amity_core::find_match;
use amity_proto::{
    ClientFrame, ConversationId, MediaRef, Message, MessageId, OutgoingMessage, TempId, UserId,
};

use crate::{
    error::{ClientError, RestError},
    event::{Attachment, ClientAction, RestRequest},
    receipts,
    rest::{MatchSummary, MessagePage},
    typing::{RemoteTyping, TypingSignaler},
};

/// Load phase of the open conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Created but not opened.
    Idle,
    /// Initial page fetch in flight.
    Loading,
    /// History loaded; accepting live updates.
    Ready,
    /// Older page fetch in flight; live updates still applied.
    LoadingMore,
    /// Initial fetch failed; waiting for a user retry.
    LoadFailed,
}

/// Render-ready copy of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Load phase.
    pub phase: ConversationPhase,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// Whether older history exists.
    pub has_more: bool,
    /// Last load error, shown with a retry affordance.
    pub load_error: Option<RestError>,
    /// Remote users currently typing.
    pub typing_users: Vec<UserId>,
    /// Counterpart summary, once fetched.
    pub counterpart: Option<MatchSummary>,
}

/// Message reconciler for one conversation.
#[derive(Debug, Clone)]
pub struct Conversation<I> {
    id: ConversationId,
    self_id: UserId,
    phase: ConversationPhase,
    messages: Vec<Message>,
    /// Stable ids already merged. A push carrying one of these is dropped.
    processed: HashSet<MessageId>,
    has_more: bool,
    /// Last page number fetched.
    page: u32,
    /// `before` cursor of the page request in flight.
    cursor: Option<MessageId>,
    page_size: u32,
    load_error: Option<RestError>,
    /// Sends waiting on their media upload. Nothing is in the list yet.
    pending_uploads: HashSet<TempId>,
    /// Failed sends to re-emit once after the next reconnect.
    resend_on_reconnect: Vec<TempId>,
    /// Sends whose REST call has not answered yet.
    rest_pending: HashSet<TempId>,
    typing: TypingSignaler<I>,
    remote_typing: RemoteTyping,
    counterpart: Option<MatchSummary>,
}

impl<I> Conversation<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an idle conversation.
    pub fn new(
        id: ConversationId,
        self_id: UserId,
        page_size: u32,
        typing_idle: Duration,
    ) -> Self {
        Self {
            id,
            self_id,
            phase: ConversationPhase::Idle,
            messages: Vec::new(),
            processed: HashSet::new(),
            has_more: false,
            page: 0,
            cursor: None,
            page_size,
            load_error: None,
            pending_uploads: HashSet::new(),
            resend_on_reconnect: Vec::new(),
            rest_pending: HashSet::new(),
            typing: TypingSignaler::new(typing_idle),
            remote_typing: RemoteTyping::default(),
            counterpart: None,
        }
    }

    /// Conversation id.
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Current phase.
    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether older history exists.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Counterpart summary, once fetched.
    pub fn counterpart(&self) -> Option<&MatchSummary> {
        self.counterpart.as_ref()
    }

    /// Render-ready copy.
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            conversation_id: self.id.clone(),
            phase: self.phase,
            messages: self.messages.clone(),
            has_more: self.has_more,
            load_error: self.load_error.clone(),
            typing_users: self.remote_typing.users(),
            counterpart: self.counterpart.clone(),
        }
    }

    /// Start the initial load and counterpart fetch.
    pub fn open(&mut self) -> Vec<ClientAction> {
        self.phase = ConversationPhase::Loading;
        vec![
            self.fetch_page(1, None),
            ClientAction::Request(RestRequest::FetchMatch { conversation_id: self.id.clone() }),
            ClientAction::ConversationChanged,
        ]
    }

    /// Retry a failed initial load. No-op unless the load failed.
    pub fn retry_load(&mut self) -> Vec<ClientAction> {
        if self.phase != ConversationPhase::LoadFailed {
            return Vec::new();
        }
        self.phase = ConversationPhase::Loading;
        self.load_error = None;
        vec![self.fetch_page(1, None), ClientAction::ConversationChanged]
    }

    /// Fetch the next older page. No-op unless `Ready` with more history.
    pub fn load_more(&mut self) -> Vec<ClientAction> {
        if self.phase != ConversationPhase::Ready || !self.has_more {
            return Vec::new();
        }
        self.phase = ConversationPhase::LoadingMore;
        self.load_error = None;

        let before = self.messages.iter().find_map(|m| m.id.clone());
        vec![self.fetch_page(self.page + 1, before), ClientAction::ConversationChanged]
    }

    fn fetch_page(&mut self, page: u32, before: Option<MessageId>) -> ClientAction {
        self.cursor.clone_from(&before);
        ClientAction::Request(RestRequest::FetchMessages {
            conversation_id: self.id.clone(),
            page,
            limit: self.page_size,
            before,
        })
    }

    /// Merge a fetched page requested with cursor `before` (`None` for the
    /// initial page). A response whose cursor is not the one in flight is
    /// stale and dropped.
    pub fn handle_messages_fetched(
        &mut self,
        before: Option<&MessageId>,
        result: Result<MessagePage, RestError>,
    ) -> Vec<ClientAction> {
        let awaited = before == self.cursor.as_ref();
        match self.phase {
            ConversationPhase::Loading if awaited => self.merge_initial_page(result),
            ConversationPhase::LoadingMore if awaited => self.merge_older_page(result),
            phase => vec![ClientAction::Log {
                message: format!(
                    "dropping page before {before:?} for {} in phase {phase:?}",
                    self.id
                ),
            }],
        }
    }

    fn merge_initial_page(&mut self, result: Result<MessagePage, RestError>) -> Vec<ClientAction> {
        let page = match result {
            Ok(page) => page,
            Err(error) => {
                self.phase = ConversationPhase::LoadFailed;
                let message = format!("initial load of {} failed: {error}", self.id);
                self.load_error = Some(error);
                return vec![ClientAction::Log { message }, ClientAction::ConversationChanged];
            },
        };

        self.has_more = page.has_more();
        self.page = page.page;
        let mut merged = chronological(page.messages);
        merged.dedup_by(|a, b| a.id.is_some() && a.id == b.id);

        // Sends and pushes that landed while the page was in flight stay
        // behind it unless the page already carries them.
        for local in std::mem::take(&mut self.messages) {
            if find_match(&merged, &local).is_none() {
                merged.push(local);
            }
        }

        self.messages = merged;
        self.processed.extend(self.messages.iter().filter_map(|m| m.id.clone()));
        self.phase = ConversationPhase::Ready;
        self.load_error = None;

        let mut actions = Vec::new();
        if receipts::mark_unread_inbound(&mut self.messages, &self.self_id) > 0 {
            actions.extend(receipts::mark_all_read_actions(&self.id));
        }
        actions.push(ClientAction::ConversationChanged);
        actions
    }

    fn merge_older_page(&mut self, result: Result<MessagePage, RestError>) -> Vec<ClientAction> {
        self.phase = ConversationPhase::Ready;

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                let message = format!("loading older messages of {} failed: {error}", self.id);
                self.load_error = Some(error);
                return vec![ClientAction::Log { message }, ClientAction::ConversationChanged];
            },
        };

        self.has_more = page.has_more();
        self.page = page.page;

        // Pages should be disjoint from what we hold; drop overlap anyway.
        let mut older: Vec<Message> = chronological(page.messages)
            .into_iter()
            .filter(|m| m.id.as_ref().is_none_or(|id| !self.processed.contains(id)))
            .collect();
        older.dedup_by(|a, b| a.id.is_some() && a.id == b.id);

        let mut actions = Vec::new();
        if receipts::mark_unread_inbound(&mut older, &self.self_id) > 0 {
            actions.extend(receipts::mark_all_read_actions(&self.id));
        }

        self.processed.extend(older.iter().filter_map(|m| m.id.clone()));
        older.append(&mut self.messages);
        self.messages = older;

        actions.push(ClientAction::ConversationChanged);
        actions
    }

    /// Record the counterpart summary.
    pub fn handle_match_fetched(
        &mut self,
        result: Result<MatchSummary, RestError>,
    ) -> Vec<ClientAction> {
        match result {
            Ok(summary) => {
                self.counterpart = Some(summary);
                vec![ClientAction::ConversationChanged]
            },
            Err(error) => vec![ClientAction::Log {
                message: format!("fetching counterpart of {} failed: {error}", self.id),
            }],
        }
    }

    /// Update the counterpart's presence. Returns `true` if it changed.
    pub fn set_counterpart_online(&mut self, user_id: &UserId, is_online: bool) -> bool {
        match &mut self.counterpart {
            Some(summary) if &summary.user_id == user_id && summary.is_online != is_online => {
                summary.is_online = is_online;
                true
            },
            _ => false,
        }
    }

    /// Insert an optimistic message and request its delivery.
    ///
    /// The entry is in the list before any I/O happens.
    pub fn send(
        &mut self,
        temp_id: TempId,
        content: String,
        media: Option<MediaRef>,
        created_at: u64,
    ) -> Vec<ClientAction> {
        let mut actions = self.stop_typing();

        let message = Message::pending(
            temp_id,
            self.id.clone(),
            self.self_id.clone(),
            content,
            media,
            created_at,
        );
        actions.extend(self.deliver(&message));
        self.messages.push(message);

        actions.push(ClientAction::ConversationChanged);
        actions
    }

    /// Start a send whose attachment must be uploaded first. Nothing is
    /// inserted until the upload succeeds.
    pub fn begin_upload(
        &mut self,
        temp_id: TempId,
        content: String,
        attachment: Attachment,
    ) -> Vec<ClientAction> {
        let mut actions = self.stop_typing();
        self.pending_uploads.insert(temp_id.clone());
        actions.push(ClientAction::Request(RestRequest::UploadMedia {
            conversation_id: self.id.clone(),
            temp_id,
            content,
            attachment,
        }));
        actions
    }

    /// Continue or abort a send after its upload finished.
    pub fn handle_media_uploaded(
        &mut self,
        temp_id: TempId,
        content: String,
        result: Result<MediaRef, RestError>,
        created_at: u64,
    ) -> Vec<ClientAction> {
        if !self.pending_uploads.remove(&temp_id) {
            return vec![ClientAction::Log { message: format!("unknown upload {temp_id}") }];
        }

        match result {
            Ok(media) => self.send(temp_id, content, Some(media), created_at),
            Err(error) => vec![ClientAction::SendAborted { temp_id, reason: error.to_string() }],
        }
    }

    /// Apply the durable send outcome.
    pub fn handle_sent(
        &mut self,
        temp_id: TempId,
        result: Result<Message, RestError>,
    ) -> Vec<ClientAction> {
        self.rest_pending.remove(&temp_id);
        let stored = match result {
            Ok(stored) => stored,
            Err(error) => return self.fail_send(&temp_id, &error.to_string(), true),
        };

        let mut confirmed = stored;
        confirmed.temp_id = Some(temp_id.clone());
        confirmed.sending = false;
        confirmed.failed = false;
        if let Some(id) = &confirmed.id {
            self.processed.insert(id.clone());
        }
        self.resend_on_reconnect.retain(|t| t != &temp_id);

        // A retried send can be stored twice. The later copy must not
        // overwrite an entry already confirmed under another id.
        let position = self
            .position_of(&temp_id)
            .filter(|&i| {
                let existing = self.messages[i].id.as_ref();
                existing.is_none() || existing == confirmed.id.as_ref()
            })
            .or_else(|| {
                let id = confirmed.id.as_ref()?;
                self.messages.iter().position(|m| m.id.as_ref() == Some(id))
            });
        let index = match position {
            Some(index) => {
                self.messages[index] = confirmed;
                index
            },
            None => {
                self.messages.push(confirmed);
                self.messages.len() - 1
            },
        };
        self.collapse_duplicates_of(index);

        vec![ClientAction::ConversationChanged]
    }

    /// Merge a realtime `new-message` push.
    pub fn handle_new_message(&mut self, message: Message) -> Vec<ClientAction> {
        if let Some(id) = &message.id
            && !self.processed.insert(id.clone())
        {
            return Vec::new();
        }

        let mut incoming = message;
        incoming.sending = false;
        incoming.failed = false;

        let mut actions = Vec::new();
        let visible =
            matches!(self.phase, ConversationPhase::Ready | ConversationPhase::LoadingMore);
        if visible && !incoming.is_from(&self.self_id) && !incoming.read {
            incoming.read = true;
            actions.push(ClientAction::Emit(ClientFrame::MarkRead {
                conversation_id: self.id.clone(),
            }));
            if let Some(message_id) = &incoming.id {
                actions.push(ClientAction::Request(RestRequest::MarkRead {
                    conversation_id: self.id.clone(),
                    message_id: message_id.clone(),
                }));
            }
        }

        match find_match(&self.messages, &incoming) {
            Some((index, _)) => {
                let existing = &self.messages[index];
                if incoming.temp_id.is_none() {
                    incoming.temp_id.clone_from(&existing.temp_id);
                }
                if let Some(temp_id) = &incoming.temp_id {
                    self.resend_on_reconnect.retain(|t| t != temp_id);
                }
                self.messages[index] = incoming;
                self.collapse_duplicates_of(index);
            },
            None => self.messages.push(incoming),
        }

        actions.push(ClientAction::ConversationChanged);
        actions
    }

    /// The server accepted a realtime send. A failed entry goes back to
    /// `sending`, since delivery is now in progress.
    pub fn handle_ack(&mut self, temp_id: &TempId) -> Vec<ClientAction> {
        let Some(index) = self.position_of(temp_id) else {
            return Vec::new();
        };
        let message = &mut self.messages[index];
        if !message.failed {
            return Vec::new();
        }
        message.failed = false;
        message.sending = true;
        self.resend_on_reconnect.retain(|t| t != temp_id);
        vec![ClientAction::ConversationChanged]
    }

    /// The server rejected a realtime send. While the REST call for the
    /// same send is outstanding the entry stays `sending`; that call
    /// settles it.
    pub fn handle_send_error(&mut self, temp_id: &TempId, error: &str) -> Vec<ClientAction> {
        if self.rest_pending.contains(temp_id) {
            return vec![ClientAction::Log {
                message: format!("realtime send {temp_id} rejected: {error}"),
            }];
        }
        self.fail_send(temp_id, error, false)
    }

    fn fail_send(&mut self, temp_id: &TempId, reason: &str, resend: bool) -> Vec<ClientAction> {
        let Some(index) = self.position_of(temp_id) else {
            return vec![ClientAction::Log { message: format!("send {temp_id} failed: {reason}") }];
        };
        let message = &mut self.messages[index];
        if message.is_confirmed() {
            return Vec::new();
        }
        message.sending = false;
        message.failed = true;
        if resend && !self.resend_on_reconnect.contains(temp_id) {
            self.resend_on_reconnect.push(temp_id.clone());
        }
        vec![
            ClientAction::Log { message: format!("send {temp_id} failed: {reason}") },
            ClientAction::ConversationChanged,
        ]
    }

    /// Apply a `message-read` push.
    pub fn handle_remote_read(&mut self, read_by: &UserId) -> Vec<ClientAction> {
        if receipts::apply_remote_read(&mut self.messages, read_by, &self.self_id) == 0 {
            return Vec::new();
        }
        vec![ClientAction::ConversationChanged]
    }

    /// Apply a `user-typing` push.
    pub fn handle_remote_typing(&mut self, user_id: &UserId, is_typing: bool) -> Vec<ClientAction> {
        if user_id == &self.self_id || !self.remote_typing.apply(user_id, is_typing) {
            return Vec::new();
        }
        vec![ClientAction::ConversationChanged]
    }

    /// Realtime re-emits for sends that failed, each at most once.
    pub fn take_resends(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.resend_on_reconnect)
            .iter()
            .filter_map(|temp_id| self.messages.iter().find(|m| m.temp_id.as_ref() == Some(temp_id)))
            .filter(|m| m.failed)
            .filter_map(outgoing)
            .map(|frame| ClientAction::Emit(ClientFrame::SendMessage(frame)))
            .collect()
    }

    /// Resend a failed message over both paths.
    pub fn retry_send(&mut self, temp_id: &TempId) -> Result<Vec<ClientAction>, ClientError> {
        let index = self.failed_position(temp_id)?;
        self.resend_on_reconnect.retain(|t| t != temp_id);

        let message = &mut self.messages[index];
        message.failed = false;
        message.sending = true;

        let message = message.clone();
        let mut actions = self.deliver(&message);
        actions.push(ClientAction::ConversationChanged);
        Ok(actions)
    }

    /// Drop a failed message.
    pub fn discard_failed(&mut self, temp_id: &TempId) -> Result<Vec<ClientAction>, ClientError> {
        let index = self.failed_position(temp_id)?;
        self.resend_on_reconnect.retain(|t| t != temp_id);
        self.messages.remove(index);
        Ok(vec![ClientAction::ConversationChanged])
    }

    /// Local keystroke.
    pub fn keystroke(&mut self, now: I) -> Vec<ClientAction> {
        self.typing.keystroke(now).map(|t| self.typing_frame(t)).into_iter().collect()
    }

    /// Advance typing timers.
    pub fn tick(&mut self, now: I) -> Vec<ClientAction> {
        self.typing.tick(now).map(|t| self.typing_frame(t)).into_iter().collect()
    }

    /// Leave the conversation. Timers are cancelled without signalling.
    pub fn close(&mut self) {
        self.typing.cancel();
        self.remote_typing.clear();
        self.pending_uploads.clear();
        self.phase = ConversationPhase::Idle;
    }

    fn deliver(&mut self, message: &Message) -> Vec<ClientAction> {
        let actions = delivery_actions(message);
        if let Some(temp_id) = &message.temp_id
            && !actions.is_empty()
        {
            self.rest_pending.insert(temp_id.clone());
        }
        actions
    }

    fn stop_typing(&mut self) -> Vec<ClientAction> {
        self.typing.stop().map(|t| self.typing_frame(t)).into_iter().collect()
    }

    fn typing_frame(&self, is_typing: bool) -> ClientAction {
        ClientAction::Emit(ClientFrame::Typing { conversation_id: self.id.clone(), is_typing })
    }

    fn position_of(&self, temp_id: &TempId) -> Option<usize> {
        self.messages.iter().position(|m| m.temp_id.as_ref() == Some(temp_id))
    }

    fn failed_position(&self, temp_id: &TempId) -> Result<usize, ClientError> {
        self.position_of(temp_id)
            .filter(|&i| self.messages[i].failed)
            .ok_or_else(|| ClientError::FailedMessageNotFound { temp_id: temp_id.clone() })
    }

    /// Remove every other entry carrying the stable id of `index`.
    fn collapse_duplicates_of(&mut self, index: usize) {
        let Some(id) = self.messages[index].id.clone() else {
            return;
        };
        let mut position = 0;
        self.messages.retain(|m| {
            let keep = position == index || m.id.as_ref() != Some(&id);
            position += 1;
            keep
        });
    }
}

/// Server pages are newest first.
fn chronological(mut messages: Vec<Message>) -> Vec<Message> {
    messages.reverse();
    messages
}

fn outgoing(message: &Message) -> Option<OutgoingMessage> {
    Some(OutgoingMessage {
        temp_id: message.temp_id.clone()?,
        conversation_id: message.conversation_id.clone(),
        content: message.content.clone(),
        media: message.media.clone(),
    })
}

/// Realtime emit plus durable REST call for a pending message.
fn delivery_actions(message: &Message) -> Vec<ClientAction> {
    let Some(frame) = outgoing(message) else {
        return Vec::new();
    };
    let request = RestRequest::SendMessage {
        conversation_id: frame.conversation_id.clone(),
        temp_id: frame.temp_id.clone(),
        content: frame.content.clone(),
        media: frame.media.clone(),
    };
    vec![ClientAction::Emit(ClientFrame::SendMessage(frame)), ClientAction::Request(request)]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use amity_proto::MediaKind;

    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn conversation() -> Conversation<Duration> {
        Conversation::new("c1".into(), "me".into(), 20, Duration::from_secs(2))
    }

    fn ready() -> Conversation<Duration> {
        let mut conv = conversation();
        conv.open();
        conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: Vec::new(),
            page: 1,
            total_pages: 1,
        }));
        conv
    }

    fn stored(id: &str, sender: &str, content: &str, created_at: u64) -> Message {
        Message {
            id: Some(id.into()),
            temp_id: None,
            conversation_id: "c1".into(),
            sender_id: sender.into(),
            content: content.into(),
            media: None,
            created_at,
            read: false,
            sending: false,
            failed: false,
        }
    }

    fn ids(conv: &Conversation<Duration>) -> Vec<Option<String>> {
        conv.messages().iter().map(|m| m.id.as_ref().map(|id| id.0.clone())).collect()
    }

    fn emits(actions: &[ClientAction]) -> Vec<&ClientFrame> {
        actions
            .iter()
            .filter_map(|a| match a {
                ClientAction::Emit(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_requests_first_page_and_counterpart() {
        let mut conv = conversation();
        let actions = conv.open();

        assert_eq!(conv.phase(), ConversationPhase::Loading);
        assert!(actions.contains(&ClientAction::Request(RestRequest::FetchMessages {
            conversation_id: "c1".into(),
            page: 1,
            limit: 20,
            before: None,
        })));
        assert!(actions.contains(&ClientAction::Request(RestRequest::FetchMatch {
            conversation_id: "c1".into(),
        })));
    }

    #[test]
    fn initial_page_is_reversed_and_marks_inbound_read() {
        let mut conv = conversation();
        conv.open();

        let actions = conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("2", "sam", "b", T0 + 1), stored("1", "sam", "a", T0)],
            page: 1,
            total_pages: 3,
        }));

        assert_eq!(conv.phase(), ConversationPhase::Ready);
        assert_eq!(ids(&conv), vec![Some("1".into()), Some("2".into())]);
        assert!(conv.has_more());
        assert!(conv.messages().iter().all(|m| m.read));
        assert!(actions.contains(&ClientAction::Request(RestRequest::MarkAllRead {
            conversation_id: "c1".into(),
        })));
    }

    #[test]
    fn initial_load_failure_is_retryable() {
        let mut conv = conversation();
        conv.open();
        conv.handle_messages_fetched(None, Err(RestError::Network("down".into())));

        assert_eq!(conv.phase(), ConversationPhase::LoadFailed);
        assert!(conv.snapshot().load_error.is_some());

        let actions = conv.retry_load();
        assert_eq!(conv.phase(), ConversationPhase::Loading);
        assert!(matches!(
            actions[0],
            ClientAction::Request(RestRequest::FetchMessages { page: 1, before: None, .. })
        ));
    }

    #[test]
    fn live_message_during_load_stays_behind_page() {
        let mut conv = conversation();
        conv.open();
        conv.handle_new_message(stored("9", "sam", "live", T0 + 9));

        conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("9", "sam", "live", T0 + 9), stored("1", "sam", "a", T0)],
            page: 1,
            total_pages: 1,
        }));

        assert_eq!(ids(&conv), vec![Some("1".into()), Some("9".into())]);
    }

    #[test]
    fn load_more_uses_earliest_stable_id_and_prepends() {
        let mut conv = conversation();
        conv.open();
        conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("11", "me", "b", T0 + 11), stored("10", "me", "a", T0 + 10)],
            page: 1,
            total_pages: 2,
        }));

        let actions = conv.load_more();
        assert_eq!(conv.phase(), ConversationPhase::LoadingMore);
        assert!(matches!(
            &actions[0],
            ClientAction::Request(RestRequest::FetchMessages { page: 2, before: Some(id), .. })
                if id.as_str() == "10"
        ));

        conv.handle_messages_fetched(Some(&"10".into()), Ok(MessagePage {
            messages: vec![stored("2", "me", "y", T0 + 2), stored("1", "me", "x", T0 + 1)],
            page: 2,
            total_pages: 2,
        }));

        assert_eq!(conv.phase(), ConversationPhase::Ready);
        assert_eq!(
            ids(&conv),
            vec![Some("1".into()), Some("2".into()), Some("10".into()), Some("11".into())]
        );
        assert!(!conv.has_more());
        assert!(conv.load_more().is_empty());
    }

    #[test]
    fn load_more_failure_keeps_list() {
        let mut conv = conversation();
        conv.open();
        conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("10", "me", "a", T0)],
            page: 1,
            total_pages: 2,
        }));
        conv.load_more();
        conv.handle_messages_fetched(Some(&"10".into()), Err(RestError::Network("reset".into())));

        assert_eq!(conv.phase(), ConversationPhase::Ready);
        assert_eq!(ids(&conv), vec![Some("10".into())]);
        assert!(conv.snapshot().load_error.is_some());
    }

    #[test]
    fn late_initial_page_during_load_more_is_dropped() {
        let mut conv = conversation();
        conv.open();
        conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("10", "me", "a", T0)],
            page: 1,
            total_pages: 2,
        }));
        conv.load_more();

        let actions = conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("10", "me", "a", T0)],
            page: 1,
            total_pages: 2,
        }));
        assert!(matches!(actions[..], [ClientAction::Log { .. }]));
        assert_eq!(conv.phase(), ConversationPhase::LoadingMore);

        conv.handle_messages_fetched(Some(&"10".into()), Ok(MessagePage {
            messages: vec![stored("9", "me", "z", T0 - 1)],
            page: 2,
            total_pages: 2,
        }));
        assert_eq!(ids(&conv), vec![Some("9".into()), Some("10".into())]);
    }

    #[test]
    fn stale_page_is_dropped() {
        let mut conv = ready();
        let actions = conv.handle_messages_fetched(None, Ok(MessagePage {
            messages: vec![stored("1", "sam", "late", T0)],
            page: 1,
            total_pages: 1,
        }));

        assert!(conv.messages().is_empty());
        assert!(matches!(actions[0], ClientAction::Log { .. }));
    }

    #[test]
    fn send_inserts_before_io_and_requests_both_paths() {
        let mut conv = ready();
        let actions = conv.send("temp-1".into(), "hello".into(), None, T0);

        let entry = &conv.messages()[0];
        assert!(entry.sending);
        assert_eq!(entry.temp_id, Some("temp-1".into()));
        assert_eq!(emits(&actions).len(), 1);
        assert!(actions.iter().any(|a| matches!(
            a,
            ClientAction::Request(RestRequest::SendMessage { temp_id, .. }) if temp_id.as_str() == "temp-1"
        )));
    }

    #[test]
    fn rest_success_confirms_in_place_and_drops_echo() {
        let mut conv = ready();
        conv.send("temp-1".into(), "hello".into(), None, T0);

        conv.handle_sent("temp-1".into(), Ok(stored("42", "me", "hello", T0 + 50)));
        let entry = &conv.messages()[0];
        assert!(!entry.sending);
        assert_eq!(entry.id, Some("42".into()));

        assert!(conv.handle_new_message(stored("42", "me", "hello", T0 + 50)).is_empty());
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn echo_before_rest_collapses_to_one_entry() {
        let mut conv = ready();
        conv.send("temp-1".into(), "hello".into(), None, T0);

        let mut echo = stored("42", "me", "hello", T0 + 80);
        echo.temp_id = Some("temp-1".into());
        conv.handle_new_message(echo);
        conv.handle_sent("temp-1".into(), Ok(stored("42", "me", "hello", T0 + 80)));

        assert_eq!(ids(&conv), vec![Some("42".into())]);
        assert!(!conv.messages()[0].sending);
    }

    #[test]
    fn unmatched_echo_is_collapsed_by_rest_response() {
        let mut conv = ready();
        conv.send("temp-1".into(), "hello".into(), None, T0);

        // Outside the fuzzy window, so appended separately.
        conv.handle_new_message(stored("42", "me", "hello", T0 + 60_000));
        assert_eq!(conv.messages().len(), 2);

        conv.handle_sent("temp-1".into(), Ok(stored("42", "me", "hello", T0 + 60_000)));
        assert_eq!(ids(&conv), vec![Some("42".into())]);
    }

    #[test]
    fn rest_failure_marks_only_that_message() {
        let mut conv = ready();
        conv.handle_new_message(stored("1", "sam", "hi", T0));
        conv.send("temp-1".into(), "a".into(), None, T0 + 1);
        conv.send("temp-2".into(), "b".into(), None, T0 + 2);

        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));

        let flags: Vec<_> = conv.messages().iter().map(|m| (m.sending, m.failed)).collect();
        assert_eq!(flags, vec![(false, false), (false, true), (true, false)]);
    }

    #[test]
    fn failed_send_is_resent_once_on_reconnect() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);
        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));

        let resends = conv.take_resends();
        assert_eq!(resends.len(), 1);
        assert!(matches!(
            &resends[0],
            ClientAction::Emit(ClientFrame::SendMessage(m)) if m.temp_id.as_str() == "temp-1"
        ));
        assert!(conv.take_resends().is_empty());
    }

    #[test]
    fn ack_revives_failed_entry() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);
        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));

        conv.handle_ack(&"temp-1".into());
        let entry = &conv.messages()[0];
        assert!(entry.sending && !entry.failed);
    }

    #[test]
    fn server_error_after_confirmation_is_ignored() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);
        conv.handle_sent("temp-1".into(), Ok(stored("7", "me", "a", T0)));

        assert!(conv.handle_send_error(&"temp-1".into(), "late").is_empty());
        assert!(!conv.messages()[0].failed);
    }

    #[test]
    fn retry_and_discard_require_failed_entry() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);

        assert_eq!(
            conv.retry_send(&"temp-1".into()),
            Err(ClientError::FailedMessageNotFound { temp_id: "temp-1".into() })
        );

        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));
        let actions = conv.retry_send(&"temp-1".into()).unwrap();
        assert_eq!(emits(&actions).len(), 1);
        assert!(conv.messages()[0].sending);

        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));
        conv.discard_failed(&"temp-1".into()).unwrap();
        assert!(conv.messages().is_empty());
    }

    #[test]
    fn realtime_error_waits_for_outstanding_rest_send() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);

        let actions = conv.handle_send_error(&"temp-1".into(), "rejected");
        assert!(matches!(actions[..], [ClientAction::Log { .. }]));
        assert!(conv.messages()[0].sending);
        assert!(conv.retry_send(&"temp-1".into()).is_err());

        conv.handle_sent("temp-1".into(), Ok(stored("m1", "me", "a", T0)));
        assert!(conv.handle_new_message(stored("m1", "me", "a", T0)).is_empty());
        assert_eq!(ids(&conv), vec![Some("m1".into())]);
        assert!(!conv.messages()[0].sending && !conv.messages()[0].failed);
    }

    #[test]
    fn realtime_error_after_rest_settles_marks_failed() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);
        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));
        conv.retry_send(&"temp-1".into()).unwrap();
        conv.handle_sent("temp-1".into(), Err(RestError::Network("down".into())));

        conv.handle_send_error(&"temp-1".into(), "rejected");
        assert!(conv.messages()[0].failed);
    }

    #[test]
    fn second_store_of_retried_send_keeps_first() {
        let mut conv = ready();
        conv.send("temp-1".into(), "a".into(), None, T0);
        conv.handle_sent("temp-1".into(), Ok(stored("m1", "me", "a", T0)));
        conv.handle_sent("temp-1".into(), Ok(stored("m2", "me", "a", T0 + 1)));

        assert!(conv.handle_new_message(stored("m1", "me", "a", T0)).is_empty());
        assert_eq!(ids(&conv), vec![Some("m1".into()), Some("m2".into())]);
    }

    #[test]
    fn upload_failure_inserts_nothing() {
        let mut conv = ready();
        let attachment =
            Attachment { bytes: vec![1, 2, 3], mime: "image/png".into(), file_name: None };
        conv.begin_upload("temp-1".into(), String::new(), attachment);
        assert!(conv.messages().is_empty());

        let actions = conv.handle_media_uploaded(
            "temp-1".into(),
            String::new(),
            Err(RestError::Status { code: 413, message: "too large".into() }),
            T0,
        );

        assert!(conv.messages().is_empty());
        assert!(matches!(actions[0], ClientAction::SendAborted { .. }));
    }

    #[test]
    fn upload_success_sends_with_media() {
        let mut conv = ready();
        let attachment =
            Attachment { bytes: vec![1], mime: "audio/webm".into(), file_name: None };
        conv.begin_upload("temp-1".into(), String::new(), attachment);

        let media = MediaRef { url: "https://cdn/x.webm".into(), kind: MediaKind::Audio };
        conv.handle_media_uploaded("temp-1".into(), String::new(), Ok(media.clone()), T0);

        assert_eq!(conv.messages()[0].media, Some(media));
        assert!(conv.messages()[0].sending);
    }

    #[test]
    fn inbound_message_marks_read_when_visible() {
        let mut conv = ready();
        let actions = conv.handle_new_message(stored("5", "sam", "hey", T0));

        assert!(conv.messages()[0].read);
        assert_eq!(emits(&actions), vec![&ClientFrame::MarkRead { conversation_id: "c1".into() }]);
        assert!(actions.contains(&ClientAction::Request(RestRequest::MarkRead {
            conversation_id: "c1".into(),
            message_id: "5".into(),
        })));
    }

    #[test]
    fn sending_stops_typing() {
        let mut conv = ready();
        conv.keystroke(Duration::ZERO);

        let actions = conv.send("temp-1".into(), "a".into(), None, T0);
        assert_eq!(emits(&actions)[0], &ClientFrame::Typing {
            conversation_id: "c1".into(),
            is_typing: false
        });
        assert!(conv.tick(Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn close_cancels_typing_silently() {
        let mut conv = ready();
        conv.keystroke(Duration::ZERO);
        conv.handle_remote_typing(&"sam".into(), true);

        conv.close();
        assert_eq!(conv.phase(), ConversationPhase::Idle);
        assert!(conv.tick(Duration::from_secs(10)).is_empty());
        assert!(conv.snapshot().typing_users.is_empty());
    }

    #[test]
    fn counterpart_presence_updates() {
        let mut conv = ready();
        conv.handle_match_fetched(Ok(MatchSummary {
            conversation_id: "c1".into(),
            user_id: "sam".into(),
            display_name: "Sam".into(),
            photo_url: None,
            is_online: false,
        }));

        assert!(conv.set_counterpart_online(&"sam".into(), true));
        assert!(!conv.set_counterpart_online(&"sam".into(), true));
        assert!(!conv.set_counterpart_online(&"kim".into(), false));
        assert!(conv.counterpart().is_some_and(|c| c.is_online));
    }
}
