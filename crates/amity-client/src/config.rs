//! Client configuration.

use std::time::Duration;

use amity_core::ConnectionConfig;

use crate::typing::DEFAULT_TYPING_IDLE;

/// Messages requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// How often the runtime feeds `Tick` into the client.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reconnection policy.
    pub connection: ConnectionConfig,
    /// Page size for message history fetches.
    pub page_size: u32,
    /// Silence after the last keystroke before `typing:false` is sent.
    pub typing_idle: Duration,
    /// Runtime tick period. Bounds timer resolution (typing, reconnect).
    pub tick_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            typing_idle: DEFAULT_TYPING_IDLE,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}
