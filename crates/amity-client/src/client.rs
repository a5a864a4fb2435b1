//! Client state machine.
//!
//! The `Client` is the top-level state machine. It owns the connection
//! policy, room membership, presence, and the single open [`Conversation`],
//! and routes every [`ClientEvent`] to the component that owns the state it
//! touches.
//!
//! Realtime emits are only produced while connected. An emit raised while
//! disconnected is dropped (and logged); the reconnect path re-joins rooms
//! and re-emits failed sends, and the REST path carries durability.

use amity_core::{
    ChannelRegistry, Connection, ConnectionAction, ConnectionState, Environment, TransportEvent,
};
use amity_proto::{ConversationId, ServerEvent, TempId, UserId};

use crate::{
    config::ClientConfig,
    conversation::{Conversation, ConversationSnapshot},
    error::ClientError,
    event::{Attachment, ClientAction, ClientEvent, RestResponse},
    presence::Presence,
};

/// Client identity, derived from the persisted auth session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Authenticated user.
    pub user_id: UserId,
}

impl ClientIdentity {
    /// Create a client identity for `user_id`.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into() }
    }
}

/// Chat client.
pub struct Client<E: Environment> {
    /// Environment for time and randomness.
    env: E,

    /// Authenticated user.
    identity: ClientIdentity,

    config: ClientConfig,

    /// Realtime connection policy.
    connection: Connection<E::Instant>,

    /// Joined rooms, re-announced after every reconnect.
    registry: ChannelRegistry,

    /// The conversation on screen, if any.
    conversation: Option<Conversation<E::Instant>>,

    presence: Presence,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client with no conversation open.
    pub fn new(env: E, identity: ClientIdentity, config: ClientConfig) -> Self {
        let connection = Connection::new(config.connection.clone());
        Self {
            env,
            identity,
            config,
            connection,
            registry: ChannelRegistry::new(),
            conversation: None,
            presence: Presence::default(),
        }
    }

    /// Authenticated user.
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    /// Realtime connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether the room has been joined.
    pub fn is_joined(&self, conversation_id: &ConversationId) -> bool {
        self.registry.contains(conversation_id)
    }

    /// The open conversation.
    pub fn conversation(&self) -> Option<&Conversation<E::Instant>> {
        self.conversation.as_ref()
    }

    /// Render-ready copy of the open conversation.
    pub fn snapshot(&self) -> Option<ConversationSnapshot> {
        self.conversation.as_ref().map(Conversation::snapshot)
    }

    /// Known presence of remote users.
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Process an event and return actions for the caller to execute.
    ///
    /// # Errors
    ///
    /// - `ClientError::NoOpenConversation` for conversation events with none
    ///   open
    /// - `ClientError::EmptyMessage` for a send with no text or attachment
    /// - `ClientError::FailedMessageNotFound` for retry/discard of an unknown
    ///   or non-failed message
    /// - `ClientError::Connection` if the transport reports an unexpected open
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = match event {
            ClientEvent::Connect => {
                let actions = self.connection.connect();
                self.translate(actions, None)
            },
            // Gated inline, before the connection goes down.
            ClientEvent::Disconnect => return Ok(self.handle_disconnect()),
            ClientEvent::TransportOpened => {
                let actions = self.connection.handle_opened()?;
                self.translate(actions, None)
            },
            ClientEvent::TransportOpenFailed { reason } => {
                let actions = self.connection.handle_open_failed(self.env.now());
                let mut out = vec![ClientAction::Log { message: format!("open failed: {reason}") }];
                out.extend(self.translate(actions, None));
                out
            },
            ClientEvent::TransportClosed { reason } => {
                let actions = self.connection.handle_closed(self.env.now());
                self.translate(actions, Some(reason))
            },
            ClientEvent::FrameReceived(event) => self.handle_server_event(event),
            ClientEvent::Tick { now } => self.handle_tick(now),
            ClientEvent::OpenConversation { conversation_id } => {
                self.open_conversation(conversation_id)
            },
            ClientEvent::CloseConversation => self.close_conversation(),
            ClientEvent::LoadMore => self.open_mut()?.load_more(),
            ClientEvent::RetryLoad => self.open_mut()?.retry_load(),
            ClientEvent::Keystroke => {
                let now = self.env.now();
                self.open_mut()?.keystroke(now)
            },
            ClientEvent::SendMessage { content, attachment } => {
                self.send_message(content, attachment)?
            },
            ClientEvent::RetrySend { temp_id } => self.open_mut()?.retry_send(&temp_id)?,
            ClientEvent::DiscardFailed { temp_id } => self.open_mut()?.discard_failed(&temp_id)?,
            ClientEvent::RestCompleted(response) => self.handle_rest(response),
        };

        Ok(self.gate(actions))
    }

    fn open_mut(&mut self) -> Result<&mut Conversation<E::Instant>, ClientError> {
        self.conversation.as_mut().ok_or(ClientError::NoOpenConversation)
    }

    /// Drop emits while not connected.
    fn gate(&self, actions: Vec<ClientAction>) -> Vec<ClientAction> {
        if self.connection.is_connected() {
            return actions;
        }

        actions
            .into_iter()
            .map(|action| match action {
                ClientAction::Emit(frame) => {
                    ClientAction::Log { message: format!("offline, not emitting {frame:?}") }
                },
                other => other,
            })
            .collect()
    }

    /// Map connection actions to client actions. `reason` is set when an
    /// established connection went down.
    fn translate(
        &mut self,
        actions: Vec<ConnectionAction>,
        reason: Option<String>,
    ) -> Vec<ClientAction> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                ConnectionAction::Open => out.push(ClientAction::Open),
                ConnectionAction::Close { reason } => out.push(ClientAction::Close { reason }),
                ConnectionAction::StateChanged(ConnectionState::Connected) => {
                    out.push(ClientAction::Notify(TransportEvent::Connected));
                    out.extend(self.registry.rejoin_frames().into_iter().map(ClientAction::Emit));
                    if let Some(conversation) = &mut self.conversation {
                        out.extend(conversation.take_resends());
                    }
                },
                ConnectionAction::StateChanged(ConnectionState::Disconnected) => match &reason {
                    Some(reason) => out.push(ClientAction::Notify(TransportEvent::Disconnected {
                        reason: reason.clone(),
                    })),
                    None => out.push(ClientAction::Log { message: "disconnected".to_string() }),
                },
                ConnectionAction::StateChanged(ConnectionState::Connecting) => {
                    out.push(ClientAction::Log {
                        message: format!("connecting (retry {})", self.connection.attempts()),
                    });
                },
                ConnectionAction::ReconnectFailed { attempts } => {
                    out.push(ClientAction::Notify(TransportEvent::ReconnectFailed { attempts }));
                },
            }
        }
        out
    }

    fn handle_disconnect(&mut self) -> Vec<ClientAction> {
        // Leave while the socket is still up.
        let closed = self.close_conversation();
        let mut actions = self.gate(closed);

        self.registry.clear();
        self.presence.clear();

        let disconnected = self.connection.disconnect();
        actions.extend(self.translate(disconnected, Some("client disconnect".to_string())));
        actions
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let retry = self.connection.tick(now);
        let mut actions = self.translate(retry, None);
        if let Some(conversation) = &mut self.conversation {
            actions.extend(conversation.tick(now));
        }
        actions
    }

    fn open_conversation(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        if self.conversation.as_ref().is_some_and(|c| c.id() == &conversation_id) {
            return Vec::new();
        }

        let mut actions = self.close_conversation();
        actions.extend(self.registry.join(&conversation_id).map(ClientAction::Emit));

        let mut conversation = Conversation::new(
            conversation_id,
            self.identity.user_id.clone(),
            self.config.page_size,
            self.config.typing_idle,
        );
        actions.extend(conversation.open());
        self.conversation = Some(conversation);
        actions
    }

    fn close_conversation(&mut self) -> Vec<ClientAction> {
        let Some(mut conversation) = self.conversation.take() else {
            return Vec::new();
        };
        conversation.close();

        let mut actions: Vec<_> =
            self.registry.leave(conversation.id()).map(ClientAction::Emit).into_iter().collect();
        actions.push(ClientAction::ConversationChanged);
        actions
    }

    fn send_message(
        &mut self,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.conversation.is_none() {
            return Err(ClientError::NoOpenConversation);
        }
        if content.trim().is_empty() && attachment.is_none() {
            return Err(ClientError::EmptyMessage);
        }

        let created_at = self.env.unix_millis();
        let temp_id = TempId::generate(created_at, self.env.random_u32());
        let conversation = self.open_mut()?;

        Ok(match attachment {
            Some(attachment) => conversation.begin_upload(temp_id, content, attachment),
            None => conversation.send(temp_id, content, None, created_at),
        })
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Vec<ClientAction> {
        if let ServerEvent::UserStatus { user_id, is_online } = &event {
            let mut changed = self.presence.set(user_id, *is_online);
            if let Some(conversation) = &mut self.conversation {
                changed |= conversation.set_counterpart_online(user_id, *is_online);
            }
            return if changed { vec![ClientAction::ConversationChanged] } else { Vec::new() };
        }

        let Some(conversation) = &mut self.conversation else {
            return Vec::new();
        };
        if event.conversation_id().is_some_and(|id| id != conversation.id()) {
            return Vec::new();
        }

        match event {
            ServerEvent::NewMessage(message) => conversation.handle_new_message(message),
            ServerEvent::MessageSendingAck { temp_id } => conversation.handle_ack(&temp_id),
            ServerEvent::MessageError { temp_id, error } => {
                conversation.handle_send_error(&temp_id, &error)
            },
            ServerEvent::MessageRead { read_by, .. } => conversation.handle_remote_read(&read_by),
            ServerEvent::UserTyping { user_id, is_typing, .. } => {
                conversation.handle_remote_typing(&user_id, is_typing)
            },
            ServerEvent::UserStatus { .. } => Vec::new(),
        }
    }

    fn handle_rest(&mut self, response: RestResponse) -> Vec<ClientAction> {
        let now_millis = self.env.unix_millis();
        let Some(conversation) =
            self.conversation.as_mut().filter(|c| c.id() == response.conversation_id())
        else {
            return vec![ClientAction::Log {
                message: format!("discarding late response for {}", response.conversation_id()),
            }];
        };

        match response {
            RestResponse::MessagesFetched { before, result, .. } => {
                conversation.handle_messages_fetched(before.as_ref(), result)
            },
            RestResponse::MessageSent { temp_id, result, .. } => {
                conversation.handle_sent(temp_id, result)
            },
            RestResponse::MediaUploaded { temp_id, content, result, .. } => {
                conversation.handle_media_uploaded(temp_id, content, result, now_millis)
            },
            RestResponse::MatchFetched { result, .. } => {
                let known = result.as_ref().ok().and_then(|summary| {
                    let is_online = self.presence.is_online(&summary.user_id)?;
                    Some((summary.user_id.clone(), is_online))
                });
                let actions = conversation.handle_match_fetched(result);
                if let Some((user_id, is_online)) = known {
                    conversation.set_counterpart_online(&user_id, is_online);
                }
                actions
            },
            RestResponse::MarkedRead { conversation_id, result: Err(error) } => {
                vec![ClientAction::Log {
                    message: format!("marking {conversation_id} read failed: {error}"),
                }]
            },
            RestResponse::MarkedRead { result: Ok(()), .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use amity_core::env::test_utils::{MockEnv, MockInstant};
    use amity_proto::{ClientFrame, Message};

    use super::*;
    use crate::{
        conversation::ConversationPhase,
        error::RestError,
        event::RestRequest,
        rest::{MatchSummary, MessagePage},
    };

    fn client() -> Client<MockEnv> {
        Client::new(MockEnv::new(), ClientIdentity::new("me"), ClientConfig::default())
    }

    fn connected() -> Client<MockEnv> {
        let mut client = client();
        client.handle(ClientEvent::Connect).unwrap();
        client.handle(ClientEvent::TransportOpened).unwrap();
        client
    }

    fn emits(actions: &[ClientAction]) -> Vec<ClientFrame> {
        actions
            .iter()
            .filter_map(|a| match a {
                ClientAction::Emit(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    fn empty_page() -> RestResponse {
        RestResponse::MessagesFetched {
            conversation_id: "c1".into(),
            before: None,
            result: Ok(MessagePage { messages: Vec::new(), page: 1, total_pages: 1 }),
        }
    }

    #[test]
    fn connect_is_idempotent() {
        let mut client = client();

        let first = client.handle(ClientEvent::Connect).unwrap();
        assert!(first.contains(&ClientAction::Open));

        let second = client.handle(ClientEvent::Connect).unwrap();
        assert!(second.is_empty());
        assert_eq!(client.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn open_conversation_joins_and_loads() {
        let mut client = connected();
        let actions =
            client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        assert_eq!(emits(&actions), vec![ClientFrame::JoinConversation {
            conversation_id: "c1".into()
        }]);
        assert!(client.is_joined(&"c1".into()));
        assert_eq!(client.snapshot().unwrap().phase, ConversationPhase::Loading);
    }

    #[test]
    fn reopening_same_conversation_is_noop() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        let actions =
            client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn switching_conversation_leaves_previous() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        let actions =
            client.handle(ClientEvent::OpenConversation { conversation_id: "c2".into() }).unwrap();

        assert_eq!(emits(&actions), vec![
            ClientFrame::LeaveConversation { conversation_id: "c1".into() },
            ClientFrame::JoinConversation { conversation_id: "c2".into() },
        ]);
        assert!(!client.is_joined(&"c1".into()));
    }

    #[test]
    fn offline_emits_are_dropped() {
        let mut client = client();
        let actions =
            client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        assert!(emits(&actions).is_empty());
        assert!(client.is_joined(&"c1".into()));
    }

    #[test]
    fn reconnect_rejoins_open_room() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        client.handle(ClientEvent::TransportClosed { reason: "reset".into() }).unwrap();
        let retry =
            client.handle(ClientEvent::Tick { now: MockInstant(Duration::from_secs(5)) }).unwrap();
        assert!(retry.contains(&ClientAction::Open));

        let actions = client.handle(ClientEvent::TransportOpened).unwrap();
        assert!(actions.contains(&ClientAction::Notify(TransportEvent::Connected)));
        assert_eq!(emits(&actions), vec![ClientFrame::JoinConversation {
            conversation_id: "c1".into()
        }]);
    }

    #[test]
    fn drop_notifies_subscribers_with_reason() {
        let mut client = connected();
        let actions =
            client.handle(ClientEvent::TransportClosed { reason: "server closed".into() }).unwrap();

        assert!(actions.contains(&ClientAction::Notify(TransportEvent::Disconnected {
            reason: "server closed".into()
        })));
    }

    #[test]
    fn unexpected_open_is_an_error() {
        let mut client = client();
        let result = client.handle(ClientEvent::TransportOpened);
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[test]
    fn conversation_events_need_open_conversation() {
        let mut client = connected();

        assert_eq!(client.handle(ClientEvent::LoadMore).unwrap_err(), ClientError::NoOpenConversation);
        assert_eq!(
            client
                .handle(ClientEvent::SendMessage { content: "hi".into(), attachment: None })
                .unwrap_err(),
            ClientError::NoOpenConversation
        );
    }

    #[test]
    fn blank_message_is_rejected() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        let result =
            client.handle(ClientEvent::SendMessage { content: "  \n".into(), attachment: None });
        assert_eq!(result.unwrap_err(), ClientError::EmptyMessage);
    }

    #[test]
    fn send_uses_generated_temp_id() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        client.handle(ClientEvent::RestCompleted(empty_page())).unwrap();

        client.handle(ClientEvent::SendMessage { content: "hi".into(), attachment: None }).unwrap();

        let snapshot = client.snapshot().unwrap();
        let temp_id = snapshot.messages[0].temp_id.clone().unwrap();
        assert!(temp_id.as_str().starts_with(TempId::PREFIX));
        assert_eq!(snapshot.messages[0].created_at, MockEnv::START_MILLIS);
    }

    #[test]
    fn late_response_for_closed_conversation_is_discarded() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c2".into() }).unwrap();

        let actions = client.handle(ClientEvent::RestCompleted(empty_page())).unwrap();

        assert!(matches!(actions[0], ClientAction::Log { .. }));
        assert_eq!(client.snapshot().unwrap().phase, ConversationPhase::Loading);
    }

    #[test]
    fn events_for_other_rooms_are_ignored() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        client.handle(ClientEvent::RestCompleted(empty_page())).unwrap();

        let message = Message {
            id: Some("9".into()),
            temp_id: None,
            conversation_id: "c2".into(),
            sender_id: "sam".into(),
            content: "elsewhere".into(),
            media: None,
            created_at: 0,
            read: false,
            sending: false,
            failed: false,
        };
        client.handle(ClientEvent::FrameReceived(ServerEvent::NewMessage(message))).unwrap();

        assert!(client.snapshot().unwrap().messages.is_empty());
    }

    #[test]
    fn presence_updates_counterpart() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        client
            .handle(ClientEvent::FrameReceived(ServerEvent::UserStatus {
                user_id: "sam".into(),
                is_online: true,
            }))
            .unwrap();
        client
            .handle(ClientEvent::RestCompleted(RestResponse::MatchFetched {
                conversation_id: "c1".into(),
                result: Ok(MatchSummary {
                    conversation_id: "c1".into(),
                    user_id: "sam".into(),
                    display_name: "Sam".into(),
                    photo_url: None,
                    is_online: false,
                }),
            }))
            .unwrap();

        assert!(client.snapshot().unwrap().counterpart.unwrap().is_online);

        client
            .handle(ClientEvent::FrameReceived(ServerEvent::UserStatus {
                user_id: "sam".into(),
                is_online: false,
            }))
            .unwrap();
        assert!(!client.snapshot().unwrap().counterpart.unwrap().is_online);
        assert_eq!(client.presence().is_online(&"sam".into()), Some(false));
    }

    #[test]
    fn upload_failure_aborts_send() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();
        client.handle(ClientEvent::RestCompleted(empty_page())).unwrap();

        let attachment = Attachment { bytes: vec![0; 4], mime: "image/jpeg".into(), file_name: None };
        let actions = client
            .handle(ClientEvent::SendMessage { content: String::new(), attachment: Some(attachment) })
            .unwrap();
        let temp_id = actions
            .iter()
            .find_map(|a| match a {
                ClientAction::Request(RestRequest::UploadMedia { temp_id, .. }) => {
                    Some(temp_id.clone())
                },
                _ => None,
            })
            .unwrap();

        let actions = client
            .handle(ClientEvent::RestCompleted(RestResponse::MediaUploaded {
                conversation_id: "c1".into(),
                temp_id,
                content: String::new(),
                result: Err(RestError::Network("timeout".into())),
            }))
            .unwrap();

        assert!(actions.iter().any(|a| matches!(a, ClientAction::SendAborted { .. })));
        assert!(client.snapshot().unwrap().messages.is_empty());
    }

    #[test]
    fn disconnect_leaves_and_resets() {
        let mut client = connected();
        client.handle(ClientEvent::OpenConversation { conversation_id: "c1".into() }).unwrap();

        let actions = client.handle(ClientEvent::Disconnect).unwrap();

        assert_eq!(emits(&actions), vec![ClientFrame::LeaveConversation {
            conversation_id: "c1".into()
        }]);
        assert!(actions.iter().any(|a| matches!(a, ClientAction::Close { .. })));
        assert!(client.snapshot().is_none());
        assert!(!client.is_joined(&"c1".into()));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        let again = client.handle(ClientEvent::Connect).unwrap();
        assert!(again.contains(&ClientAction::Open));
    }
}
