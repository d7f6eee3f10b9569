//! Lifecycle events sessions emit toward the orchestrator's consumer.

use crate::error::SessionError;
use crate::session::profile::SessionId;

/// One session's lifecycle signal.
///
/// These are the engine's only outbound side effect: logging, UIs and
/// statistics are collaborators consuming this stream.
#[derive(Debug)]
pub enum SessionEvent {
    /// The session reached `Play`.
    Connected,

    /// Orderly end: server disconnect or local stop.
    Disconnected { reason: String },

    /// The session died of a fatal, session-local error.
    Failed { error: SessionError },
}

/// A lifecycle event tagged with its session.
#[derive(Debug)]
pub struct SessionNotice {
    pub session_id: SessionId,
    pub event: SessionEvent,
}
