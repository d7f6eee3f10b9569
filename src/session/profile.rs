//! Session identity and start parameters.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::token::AccountRef;
use crate::protocol::version::ProtocolVersion;

/// Unique id of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty for log correlation.
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// Everything needed to start one simulated client.
///
/// Immutable once the session starts: the session clones what it needs and
/// never writes back. In particular the protocol version is fixed — the
/// pipeline resolved from it is reused for every frame of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Server address, `host:port`.
    pub address: String,

    /// Protocol version this client will speak on the wire.
    pub protocol_version: ProtocolVersion,

    /// Which account logs in.
    pub account: AccountRef,

    /// Locale reported during configuration.
    pub locale: String,

    /// View distance reported during configuration.
    pub view_distance: u8,
}

impl SessionProfile {
    pub fn new(
        address: impl Into<String>,
        protocol_version: ProtocolVersion,
        account: AccountRef,
    ) -> Self {
        Self {
            address: address.into(),
            protocol_version,
            account,
            locale: "en_us".into(),
            view_distance: 10,
        }
    }
}
