//! Strongly-typed identifiers.
//!
//! Server ids are opaque strings. Wrapping them keeps a conversation id from
//! being passed where a user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an id from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Conversation (match) identifier. Also names the realtime room.
    ConversationId
);

string_id!(
    /// User identifier.
    UserId
);

string_id!(
    /// Server-assigned message identifier. Authoritative once known.
    MessageId
);

string_id!(
    /// Client-generated identifier for a message the server has not yet
    /// assigned a [`MessageId`] to.
    TempId
);

impl TempId {
    /// Prefix shared by every client-generated id.
    pub const PREFIX: &'static str = "temp-";

    /// Build a temp id from a wall-clock timestamp and a random suffix.
    ///
    /// The timestamp keeps ids distinct across a session; the suffix covers
    /// two sends in the same millisecond.
    pub fn generate(unix_millis: u64, nonce: u32) -> Self {
        Self(format!("{}{unix_millis}-{nonce:08x}", Self::PREFIX))
    }
}
