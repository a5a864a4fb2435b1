//! Persisted authentication session.
//!
//! The login flow stores a JSON blob holding the token, the user, and a
//! profile summary. The client reads it once at startup; the user id it
//! carries is the identity used everywhere else.

use std::{fs, path::Path};

use amity_proto::UserId;
use serde::{Deserialize, Serialize};

use crate::{client::ClientIdentity, error::SessionError};

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// User id.
    pub id: UserId,
    /// Account name.
    #[serde(default)]
    pub name: String,
}

/// Profile summary cached with the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Name shown to matches.
    pub display_name: String,
    /// Main profile photo.
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Authentication blob.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for REST and the socket handshake.
    pub token: String,
    /// Authenticated user.
    pub user: SessionUser,
    /// Cached profile.
    #[serde(default)]
    pub profile: Option<ProfileSummary>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .field("profile", &self.profile)
            .finish()
    }
}

impl AuthSession {
    /// Read the blob from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse a blob.
    ///
    /// # Errors
    ///
    /// - `SessionError::Parse` if the JSON does not match
    /// - `SessionError::MissingToken` if the token is blank
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let session: Self = serde_json::from_str(json)?;
        if session.token.trim().is_empty() {
            return Err(SessionError::MissingToken);
        }
        Ok(session)
    }

    /// Client identity for this session.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity::new(self.user.id.clone())
    }
}
