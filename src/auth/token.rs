//! Account references and session tokens.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Selects one account known to the authentication service.
///
/// Opaque to the engine: the authenticator decides what the string means
/// (a username, an email, a vault key). Used as the token-cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef(pub String);

impl AccountRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials for one account, valid until `expires_at`.
///
/// Shared by the auth provider and sessions; refresh is the only mutation
/// path (a refresh produces a replacement token, it never edits one in
/// place). A token must never be presented past its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub account_id: Uuid,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Instant,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// True when remaining validity has fallen under `margin` — the
    /// provider refreshes proactively at this point rather than letting
    /// the token run out mid-login.
    pub fn expires_within(&self, margin: Duration) -> bool {
        Instant::now() + margin >= self.expires_at
    }
}
