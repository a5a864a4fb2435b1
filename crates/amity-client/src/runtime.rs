//! Async runtime for the client.
//!
//! The [`Runtime`] is the driver the Sans-IO [`Client`] assumes. It owns the
//! socket link, runs REST requests concurrently, feeds ticks, and delivers
//! events to subscribers. It is a single task: the client state machine is
//! only ever touched from the select loop, so interleaving between a REST
//! completion and a realtime push happens at well-defined event boundaries.
//!
//! Applications talk to a running runtime through a cloneable [`Handle`].

use std::{future::Future, sync::Arc, time::Duration};

use amity_core::{
    ConnectionState, Environment, EventDispatcher, Scope, SubscriptionId, TransportEvent,
    dispatcher::Callback,
};
use amity_proto::{ClientFrame, ConversationId, EventKind, ServerEvent, TempId};
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::AbortHandle,
    time::MissedTickBehavior,
};

use crate::{
    client::{Client, ClientIdentity},
    config::ClientConfig,
    conversation::ConversationSnapshot,
    error::{RuntimeError, TransportError},
    event::{Attachment, ClientAction, ClientEvent, RestResponse},
    rest::{RestApi, execute},
};

/// Frames buffered towards the socket before emits are dropped.
pub const LINK_BUFFER: usize = 64;

/// Opens authenticated realtime links.
pub trait Connector: Send + Sync + 'static {
    /// Open a link. Credentials are the connector's concern.
    fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send;
}

/// An open realtime link: channels bridged to the socket by a background
/// task. The link is closed when `from_server` yields `None`.
pub struct Link {
    /// Frames to the server.
    pub to_server: mpsc::Sender<ClientFrame>,
    /// Events from the server.
    pub from_server: mpsc::Receiver<ServerEvent>,
    abort: Option<AbortHandle>,
}

impl Link {
    /// Wrap a pair of channels.
    pub fn new(
        to_server: mpsc::Sender<ClientFrame>,
        from_server: mpsc::Receiver<ServerEvent>,
    ) -> Self {
        Self { to_server, from_server, abort: None }
    }

    /// Attach the task bridging the channels, so [`Link::stop`] can end it.
    #[must_use]
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Stop the bridging task.
    pub fn stop(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

/// Requests from a [`Handle`] to the runtime task.
pub enum Command {
    /// Open a conversation.
    OpenConversation(ConversationId),
    /// Close the open conversation.
    CloseConversation,
    /// Send a message in the open conversation.
    SendMessage {
        /// Text body.
        content: String,
        /// Optional media.
        attachment: Option<Attachment>,
    },
    /// Composer keystroke.
    Keystroke,
    /// Fetch the next older page.
    LoadMore,
    /// Retry a failed initial load.
    RetryLoad,
    /// Resend a failed message.
    RetrySend(TempId),
    /// Drop a failed message.
    DiscardFailed(TempId),
    /// Register an event callback.
    Subscribe {
        /// Routing scope.
        scope: Scope,
        /// Event kind.
        kind: EventKind,
        /// Callback.
        callback: Callback,
        /// Receives the subscription id.
        reply: oneshot::Sender<SubscriptionId>,
    },
    /// Remove an event callback.
    Unsubscribe(SubscriptionId),
    /// Open the transport. Resets the retry budget after a give-up.
    Connect,
    /// Leave rooms, close the socket and drop every subscription. The
    /// runtime keeps running.
    Disconnect,
    /// Leave rooms, close the socket, drop every subscription, and stop.
    Logout,
}

/// Cloneable handle to a running [`Runtime`].
#[derive(Clone)]
pub struct Handle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Option<ConversationSnapshot>>,
    state: watch::Receiver<ConnectionState>,
}

impl Handle {
    fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).map_err(|_| RuntimeError::Closed)
    }

    /// Connect, or reconnect after the retry budget ran out.
    pub fn connect(&self) -> Result<(), RuntimeError> {
        self.send(Command::Connect)
    }

    /// Go offline without stopping the runtime.
    pub fn disconnect(&self) -> Result<(), RuntimeError> {
        self.send(Command::Disconnect)
    }

    /// Open a conversation.
    pub fn open_conversation(&self, conversation_id: ConversationId) -> Result<(), RuntimeError> {
        self.send(Command::OpenConversation(conversation_id))
    }

    /// Close the open conversation.
    pub fn close_conversation(&self) -> Result<(), RuntimeError> {
        self.send(Command::CloseConversation)
    }

    /// Send a message.
    pub fn send_message(
        &self,
        content: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Result<(), RuntimeError> {
        self.send(Command::SendMessage { content: content.into(), attachment })
    }

    /// Report a composer keystroke.
    pub fn keystroke(&self) -> Result<(), RuntimeError> {
        self.send(Command::Keystroke)
    }

    /// Fetch older history.
    pub fn load_more(&self) -> Result<(), RuntimeError> {
        self.send(Command::LoadMore)
    }

    /// Retry a failed initial load.
    pub fn retry_load(&self) -> Result<(), RuntimeError> {
        self.send(Command::RetryLoad)
    }

    /// Resend a failed message.
    pub fn retry_send(&self, temp_id: TempId) -> Result<(), RuntimeError> {
        self.send(Command::RetrySend(temp_id))
    }

    /// Drop a failed message.
    pub fn discard_failed(&self, temp_id: TempId) -> Result<(), RuntimeError> {
        self.send(Command::DiscardFailed(temp_id))
    }

    /// Register `callback` for events of `kind` in `scope`.
    pub async fn subscribe<F>(
        &self,
        scope: Scope,
        kind: EventKind,
        callback: F,
    ) -> Result<SubscriptionId, RuntimeError>
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        let (reply, id) = oneshot::channel();
        self.send(Command::Subscribe { scope, kind, callback: Box::new(callback), reply })?;
        id.await.map_err(|_| RuntimeError::Closed)
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), RuntimeError> {
        self.send(Command::Unsubscribe(id))
    }

    /// Tear down the session and stop the runtime.
    pub fn logout(&self) -> Result<(), RuntimeError> {
        self.send(Command::Logout)
    }

    /// Latest snapshot of the open conversation.
    pub fn snapshot(&self) -> Option<ConversationSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Watch conversation snapshots.
    pub fn snapshots(&self) -> watch::Receiver<Option<ConversationSnapshot>> {
        self.snapshots.clone()
    }

    /// Latest connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state.
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

/// Drives a [`Client`] against a [`Connector`] and a [`RestApi`].
pub struct Runtime<E, C, R>
where
    E: Environment,
    C: Connector,
    R: RestApi,
{
    env: E,
    client: Client<E>,
    connector: Arc<C>,
    rest: R,
    dispatcher: EventDispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    link: Option<Link>,
    connecting: Option<BoxFuture<'static, Result<Link, TransportError>>>,
    in_flight: FuturesUnordered<BoxFuture<'static, RestResponse>>,
    snapshots: watch::Sender<Option<ConversationSnapshot>>,
    state: watch::Sender<ConnectionState>,
    tick_interval: Duration,
}

impl<E, C, R> Runtime<E, C, R>
where
    E: Environment,
    C: Connector,
    R: RestApi,
{
    /// Create a runtime and the handle that controls it.
    pub fn new(
        env: E,
        identity: ClientIdentity,
        config: ClientConfig,
        connector: C,
        rest: R,
    ) -> (Self, Handle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let tick_interval = config.tick_interval;
        let runtime = Self {
            client: Client::new(env.clone(), identity, config),
            env,
            connector: Arc::new(connector),
            rest,
            dispatcher: EventDispatcher::new(),
            commands: commands_rx,
            link: None,
            connecting: None,
            in_flight: FuturesUnordered::new(),
            snapshots: snapshots_tx,
            state: state_tx,
            tick_interval,
        };
        let handle = Handle { commands: commands_tx, snapshots: snapshots_rx, state: state_rx };

        (runtime, handle)
    }

    /// Register a callback before the runtime starts.
    pub fn subscribe<F>(&mut self, scope: Scope, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        self.dispatcher.subscribe(scope, kind, callback)
    }

    /// Connect and run until logout or until every [`Handle`] is dropped.
    pub async fn run(mut self) {
        self.apply(ClientEvent::Connect);

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command) {
                        break;
                    }
                },
                opened = next_link(&mut self.connecting) => match opened {
                    Ok(link) => {
                        self.link = Some(link);
                        self.apply(ClientEvent::TransportOpened);
                    },
                    Err(error) => {
                        tracing::warn!(%error, "connection attempt failed");
                        self.apply(ClientEvent::TransportOpenFailed { reason: error.to_string() });
                    },
                },
                received = next_server_event(&mut self.link) => match received {
                    Some(event) => self.handle_server_event(event),
                    None => {
                        self.link = None;
                        self.apply(ClientEvent::TransportClosed {
                            reason: "connection closed by server".to_string(),
                        });
                    },
                },
                Some(response) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.apply(ClientEvent::RestCompleted(response));
                },
                _ = ticker.tick() => {
                    let now = self.env.now();
                    self.apply(ClientEvent::Tick { now });
                },
            }
        }

        self.shutdown();
    }

    /// Returns `false` when the runtime should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        let event = match command {
            Command::OpenConversation(conversation_id) => {
                ClientEvent::OpenConversation { conversation_id }
            },
            Command::CloseConversation => ClientEvent::CloseConversation,
            Command::SendMessage { content, attachment } => {
                ClientEvent::SendMessage { content, attachment }
            },
            Command::Keystroke => ClientEvent::Keystroke,
            Command::LoadMore => ClientEvent::LoadMore,
            Command::RetryLoad => ClientEvent::RetryLoad,
            Command::RetrySend(temp_id) => ClientEvent::RetrySend { temp_id },
            Command::DiscardFailed(temp_id) => ClientEvent::DiscardFailed { temp_id },
            Command::Subscribe { scope, kind, callback, reply } => {
                let id = self.dispatcher.subscribe(scope, kind, callback);
                // Caller may have stopped waiting.
                let _ = reply.send(id);
                return true;
            },
            Command::Unsubscribe(id) => {
                self.dispatcher.unsubscribe(id);
                return true;
            },
            Command::Connect => ClientEvent::Connect,
            Command::Disconnect => {
                self.apply(ClientEvent::Disconnect);
                self.connecting = None;
                self.dispatcher.clear();
                return true;
            },
            Command::Logout => return false,
        };

        self.apply(event);
        true
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        self.apply(ClientEvent::FrameReceived(event.clone()));
        self.dispatcher.dispatch(&TransportEvent::Server(event));
    }

    fn apply(&mut self, event: ClientEvent<E::Instant>) {
        match self.client.handle(event) {
            Ok(actions) => self.execute(actions),
            Err(error) => tracing::warn!(%error, "event rejected"),
        }
        self.publish();
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Emit(frame) => self.emit(frame),
                ClientAction::Request(request) => {
                    self.in_flight.push(execute(self.rest.clone(), request).boxed());
                },
                ClientAction::Open => {
                    self.drop_link();
                    let connector = Arc::clone(&self.connector);
                    self.connecting = Some(async move { connector.connect().await }.boxed());
                },
                ClientAction::Close { reason } => {
                    tracing::info!(%reason, "closing connection");
                    self.drop_link();
                    self.connecting = None;
                },
                ClientAction::Notify(event) => {
                    match &event {
                        TransportEvent::Connected => tracing::info!("connected"),
                        TransportEvent::Disconnected { reason } => {
                            tracing::info!(%reason, "disconnected");
                        },
                        TransportEvent::ReconnectFailed { attempts } => {
                            tracing::warn!(attempts, "giving up on reconnecting");
                        },
                        TransportEvent::Server(_) => {},
                    }
                    self.dispatcher.dispatch(&event);
                },
                ClientAction::ConversationChanged => {},
                ClientAction::SendAborted { temp_id, reason } => {
                    tracing::warn!(%temp_id, %reason, "send aborted");
                },
                ClientAction::Log { message } => tracing::debug!("{message}"),
            }
        }
    }

    fn emit(&self, frame: ClientFrame) {
        let Some(link) = &self.link else {
            tracing::debug!(?frame, "no link, dropping frame");
            return;
        };
        if let Err(error) = link.to_server.try_send(frame) {
            tracing::warn!(%error, "dropping outbound frame");
        }
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.stop();
        }
    }

    fn publish(&mut self) {
        let snapshot = self.client.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        let state = self.client.connection_state();
        self.state.send_if_modified(|current| std::mem::replace(current, state) != state);
    }

    fn shutdown(&mut self) {
        tracing::info!("logging out");
        self.apply(ClientEvent::Disconnect);
        self.drop_link();
        self.connecting = None;
        self.in_flight.clear();
        self.dispatcher.clear();
    }
}

/// Resolves when the in-flight connection attempt finishes. Pending forever
/// if there is none.
async fn next_link(
    connecting: &mut Option<BoxFuture<'static, Result<Link, TransportError>>>,
) -> Result<Link, TransportError> {
    let Some(attempt) = connecting else {
        return std::future::pending().await;
    };
    let result = attempt.await;
    *connecting = None;
    result
}

/// Next event from the link. `None` means the link closed; pending forever
/// if there is no link.
async fn next_server_event(link: &mut Option<Link>) -> Option<ServerEvent> {
    match link {
        Some(link) => link.from_server.recv().await,
        None => std::future::pending().await,
    }
}
