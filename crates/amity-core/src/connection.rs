//! Connection lifecycle state machine.
//!
//! Owns the connect/reconnect policy for the single realtime connection. Uses
//! the action pattern: methods take time as input and return actions for the
//! driver to execute (open a socket, close it, tell subscribers). The socket
//! itself lives in the driver.
//!
//! # State Machine
//!
//! ```text
//!                connect()               opened
//! ┌──────────────┐ ──────> ┌────────────┐ ─────> ┌───────────┐
//! │ Disconnected │         │ Connecting │        │ Connected │
//! └──────────────┘ <────── └────────────┘        └───────────┘
//!     │     ↑      open failed    ↑                    │
//!     │     │                     │ tick (delay        │ closed
//!     │     └─────────────────────┼──elapsed)──────────┘
//!     └───────────────────────────┘
//! ```
//!
//! A drop schedules a retry after `reconnect_delay`. After
//! `max_reconnect_attempts` consecutive failures the machine stays
//! `Disconnected` and reports [`ConnectionAction::ReconnectFailed`].

use std::{ops::Sub, time::Duration};

use crate::error::ConnectionError;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default spacing between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open the transport (with the credentials the driver holds).
    Open,

    /// Close the transport.
    Close {
        /// Reason for closing the connection
        reason: String,
    },

    /// Observable state changed.
    StateChanged(ConnectionState),

    /// Retries exhausted; the connection stays down until `connect()`.
    ReconnectFailed {
        /// Attempts made since the last successful open.
        attempts: u32,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport, or waiting for the next retry.
    Disconnected,
    /// Transport open in flight.
    Connecting,
    /// Transport open and authenticated.
    Connected,
}

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Consecutive failed opens tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each retry.
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Connection state machine.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Retries made since the last successful open.
    attempts: u32,
    /// When the pending retry was scheduled. `None` if none is pending.
    retry_scheduled_at: Option<I>,
    /// Set by `connect()`, cleared by `disconnect()` or exhaustion. A drop
    /// only triggers a retry while this is set.
    wanted: bool,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a connection in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            attempts: 0,
            retry_scheduled_at: None,
            wanted: false,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether frames can be emitted right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Retries made since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a retry is waiting for its delay to elapse.
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_scheduled_at.is_some()
    }

    /// Start connecting.
    ///
    /// No-op while `Connecting` or `Connected`. From `Disconnected` (including
    /// while a retry is pending) it resets the retry budget and opens now.
    pub fn connect(&mut self) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }

        self.wanted = true;
        self.attempts = 0;
        self.retry_scheduled_at = None;
        self.state = ConnectionState::Connecting;

        vec![ConnectionAction::StateChanged(ConnectionState::Connecting), ConnectionAction::Open]
    }

    /// Transport open succeeded.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if no open was in flight
    pub fn handle_opened(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connecting {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "handle_opened",
            });
        }

        self.state = ConnectionState::Connected;
        self.attempts = 0;

        Ok(vec![ConnectionAction::StateChanged(ConnectionState::Connected)])
    }

    /// Transport open failed (refused, handshake rejected).
    ///
    /// Ignored unless an open was in flight.
    pub fn handle_open_failed(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnected;
        let mut actions = vec![ConnectionAction::StateChanged(ConnectionState::Disconnected)];
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Established transport dropped (server close, network loss, token
    /// invalidated).
    ///
    /// Ignored unless connected.
    pub fn handle_closed(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }

        self.state = ConnectionState::Disconnected;
        let mut actions = vec![ConnectionAction::StateChanged(ConnectionState::Disconnected)];
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Process periodic maintenance. Opens the transport once a pending
    /// retry's delay has elapsed.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(scheduled_at) = self.retry_scheduled_at else {
            return Vec::new();
        };

        if now - scheduled_at < self.config.reconnect_delay {
            return Vec::new();
        }

        self.retry_scheduled_at = None;
        self.attempts += 1;
        self.state = ConnectionState::Connecting;

        vec![ConnectionAction::StateChanged(ConnectionState::Connecting), ConnectionAction::Open]
    }

    /// Tear down the connection and reset to a state from which `connect()`
    /// starts cleanly.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let previous = self.state;

        self.wanted = false;
        self.attempts = 0;
        self.retry_scheduled_at = None;
        self.state = ConnectionState::Disconnected;

        if previous == ConnectionState::Disconnected {
            return Vec::new();
        }

        vec![
            ConnectionAction::Close { reason: "client disconnect".to_string() },
            ConnectionAction::StateChanged(ConnectionState::Disconnected),
        ]
    }

    fn schedule_retry(&mut self, now: I) -> Vec<ConnectionAction> {
        if !self.wanted {
            return Vec::new();
        }

        if self.attempts >= self.config.max_reconnect_attempts {
            self.wanted = false;
            return vec![ConnectionAction::ReconnectFailed { attempts: self.attempts }];
        }

        self.retry_scheduled_at = Some(now);
        Vec::new()
    }
}
