//! # Error Types
//!
//! Error taxonomy for the session engine.
//!
//! Every error here is *session-local*: a failing session reports a
//! `Failed` lifecycle event and dies, and the orchestrator keeps managing
//! the remaining sessions. Nothing in this module escalates to a
//! process-wide failure.
//!
//! ## Error Categories
//! - **Codec**: framing, compression or encryption corruption on the wire
//! - **Translation**: a packet cannot be safely represented across versions
//! - **ProtocolState**: a packet arrived in a connection state where it is illegal
//! - **Auth**: authentication or token refresh failed after retries
//! - **Transport**: connection refused/reset/timed out
//!
//! All of these are fatal to the owning session. Auth and transport
//! failures are retried locally (bounded backoff) before being classified
//! fatal; codec, translation and state errors are never retried because
//! the stream can no longer be trusted after corruption.

use std::io;
use thiserror::Error;

use crate::protocol::packet::PacketKind;
use crate::protocol::state::ConnectionState;
use crate::protocol::version::ProtocolVersion;

/// Corruption at the framing/compression/encryption layer.
///
/// Stream framing cannot be trusted after any of these, so there is no
/// partial recovery: the owning session terminates.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed varint length prefix")]
    MalformedLength,

    #[error("Frame of {0} bytes exceeds maximum of {1}")]
    OversizedFrame(usize, usize),

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Declared uncompressed length {0} exceeds limit {1}")]
    DecompressionBomb(usize, usize),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Packet field malformed or out of range")]
    MalformedField,
}

/// The pipeline cannot safely represent a packet across versions.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("No transform stage registered between {older} and {newer}")]
    MissingStage {
        older: ProtocolVersion,
        newer: ProtocolVersion,
    },

    #[error("Packet id {id:#04x} is required at {version} but cannot be represented")]
    Unrepresentable { id: u32, version: ProtocolVersion },
}

/// A packet arrived (or was submitted) in a state where it is illegal.
#[derive(Error, Debug)]
#[error("{kind:?} is illegal in state {state:?}")]
pub struct ProtocolStateError {
    pub state: ConnectionState,
    pub kind: PacketKind,
}

/// Authentication or token refresh failed.
///
/// `Clone` so the cached outcome of a coalesced auth flow can be handed to
/// every waiting session.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Authentication service error: {0}")]
    Service(String),

    #[error("Authentication attempts exhausted after {0} tries")]
    AttemptsExhausted(u32),

    #[error("Token for account {0} expired and refresh failed")]
    TokenExpired(String),

    #[error("Account {0} rejected by authentication service")]
    Rejected(String),
}

/// Connection-level transport failure.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(io::Error),

    #[error("Connect timed out after {0} ms")]
    ConnectTimeout(u64),

    #[error("Read timed out after {0} ms of inactivity")]
    ReadTimeout(u64),

    #[error("Connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Top-level session error: every way a session can die.
///
/// The orchestrator reports this inside the `Failed` lifecycle event and
/// never lets it propagate past the owning session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Protocol state error: {0}")]
    ProtocolState(#[from] ProtocolStateError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;
