//! Protocol version axis.
//!
//! Versions are totally ordered integers. The engine speaks exactly one of
//! them natively — the canonical version — and reaches every other one
//! through the transform-stage chain. Which versions exist between two
//! endpoints is defined by the registered stages, not by this type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A game protocol version number. Ordered; higher is newer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    /// The engine's internal, version-independent representation is pinned
    /// to this wire version. Canonical packets encode/decode at it.
    pub const CANONICAL: ProtocolVersion = ProtocolVersion(760);

    pub fn is_canonical(self) -> bool {
        self == Self::CANONICAL
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u32> for ProtocolVersion {
    fn from(v: u32) -> Self {
        ProtocolVersion(v)
    }
}

/// Named releases the stock engine knows about, newest last.
///
/// Collaborator-supplied stage tables may cover any subset of these, or
/// versions not listed here at all; the table is for name lookup only.
pub const KNOWN_VERSIONS: &[(&str, ProtocolVersion)] = &[
    ("1.4.2", ProtocolVersion(756)),
    ("1.4.3", ProtocolVersion(757)),
    ("1.5.0", ProtocolVersion(758)),
    ("1.5.1", ProtocolVersion(759)),
    ("1.6.0", ProtocolVersion(760)),
];

/// Look a version up by its release name.
pub fn by_name(name: &str) -> Option<ProtocolVersion> {
    KNOWN_VERSIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// The newest release the engine knows a name for.
pub fn newest() -> ProtocolVersion {
    KNOWN_VERSIONS
        .iter()
        .map(|(_, v)| *v)
        .max()
        .unwrap_or(ProtocolVersion::CANONICAL)
}
