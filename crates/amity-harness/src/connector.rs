//! In-memory links.
//!
//! [`ChannelConnector`] hands the runtime a [`Link`] made of plain channels
//! and gives the test the other end as a [`ServerEnd`]. Dropping a
//! `ServerEnd` is a server-side close.

#![allow(clippy::disallowed_types, reason = "Synchronous counters only")]

use std::sync::{Arc, Mutex, PoisonError};

use amity_client::{Connector, LINK_BUFFER, Link, TransportError};
use amity_proto::{ClientFrame, ServerEvent};
use tokio::sync::mpsc;

/// The server's side of a link.
#[derive(Debug)]
pub struct ServerEnd {
    /// Frames the client emitted.
    pub from_client: mpsc::Receiver<ClientFrame>,
    /// Push events to the client.
    pub to_client: mpsc::Sender<ServerEvent>,
}

impl ServerEnd {
    /// Push an event to the client.
    pub async fn push(&self, event: ServerEvent) {
        // Runtime gone means the test is over.
        let _ = self.to_client.send(event).await;
    }

    /// Next frame from the client.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.from_client.recv().await
    }

    /// Frames emitted so far, without waiting.
    pub fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[derive(Debug, Default)]
struct State {
    attempts: u32,
    refusals: u32,
}

/// Connector producing in-memory links.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    state: Arc<Mutex<State>>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl ChannelConnector {
    /// Create a connector. Each accepted connection's [`ServerEnd`] arrives
    /// on the returned receiver.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, ends) = mpsc::unbounded_channel();
        (Self { state: Arc::new(Mutex::new(State::default())), accepted }, ends)
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: u32) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).refusals = count;
    }

    /// Connection attempts so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).attempts
    }
}

impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.attempts += 1;
            if state.refusals > 0 {
                state.refusals -= 1;
                return Err(TransportError::Connection("connection refused".to_string()));
            }
        }

        let (to_server, from_client) = mpsc::channel(LINK_BUFFER);
        let (to_client, from_server) = mpsc::channel(LINK_BUFFER);
        self.accepted
            .send(ServerEnd { from_client, to_client })
            .map_err(|_| TransportError::Connection("server gone".to_string()))?;

        tracing::debug!("in-memory link opened");
        Ok(Link::new(to_server, from_server))
    }
}
