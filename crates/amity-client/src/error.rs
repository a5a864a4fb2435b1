//! Client error types.

use std::io;

use amity_core::ConnectionError;
use amity_proto::TempId;
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`] when an event's precondition
/// does not hold. State is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The event needs an open conversation.
    #[error("no conversation is open")]
    NoOpenConversation,

    /// Message has neither text nor attachment.
    #[error("message is empty")]
    EmptyMessage,

    /// No failed message carries this temp id.
    #[error("no failed message with temp id {temp_id}")]
    FailedMessageNotFound {
        /// Temp id that was looked up.
        temp_id: TempId,
    },

    /// Connection state machine rejected the transition.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Errors reported by a [`crate::RestApi`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestError {
    /// Server answered with a non-success status.
    #[error("HTTP {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Request never got an answer.
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not parse.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RestError {
    /// Whether retrying the same request may succeed.
    ///
    /// Network failures and 5xx/429 responses are transient. Other 4xx
    /// responses and undecodable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Socket-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection or handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Credentials could not be attached to the request.
    #[error("invalid credentials: {0}")]
    Credentials(String),
}

/// Errors loading the persisted auth blob.
#[derive(Debug, Error)]
pub enum SessionError {
    /// File could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File is not a valid auth blob.
    #[error("invalid auth blob: {0}")]
    Parse(#[from] serde_json::Error),

    /// Blob has no token; the user must log in again.
    #[error("auth blob has no token")]
    MissingToken,
}

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime task has stopped; commands can no longer be delivered.
    #[error("runtime has shut down")]
    Closed,
}
