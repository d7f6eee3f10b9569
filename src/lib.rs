//! # swarmlink
//!
//! Multi-version protocol translation and concurrent session
//! orchestration core for simulated game clients.
//!
//! The engine opens and drives many concurrent client sessions against a
//! server, each session capable of speaking a protocol version different
//! from the canonical one the engine understands natively.
//!
//! ## Architecture
//! - [`codec`]: varint-framed wire codec with negotiated compression and
//!   encryption
//! - [`protocol`]: canonical packets, the per-version translation
//!   pipeline and the connection state machine
//! - [`auth`]: token acquisition/refresh with a process-wide coalescing
//!   cache
//! - [`session`]: per-session tasks and the orchestrator (admission
//!   control, staged startup, bounded teardown)
//! - [`transport`]: the connector seam over raw byte streams
//!
//! ## Example
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use swarmlink::auth::{AuthProvider, OfflineAuthenticator, AccountRef};
//! use swarmlink::config::EngineConfig;
//! use swarmlink::protocol::{ProtocolVersion, StageRegistry};
//! use swarmlink::session::{Orchestrator, SessionProfile};
//! use swarmlink::transport::TcpConnector;
//!
//! # async fn run() -> swarmlink::error::Result<()> {
//! let config = EngineConfig::default();
//! let registry = Arc::new(StageRegistry::new());
//! let auth = Arc::new(AuthProvider::new(
//!     Arc::new(OfflineAuthenticator::default()),
//!     config.auth.clone(),
//! ));
//! let connector = Arc::new(TcpConnector::new(config.session.connect_timeout()));
//!
//! let mut orchestrator = Orchestrator::new(config, registry, auth, connector);
//! let mut events = orchestrator.take_events().expect("first take");
//!
//! let profiles: Vec<_> = (0..100)
//!     .map(|i| SessionProfile::new(
//!         "127.0.0.1:25565",
//!         ProtocolVersion::CANONICAL,
//!         AccountRef::new(format!("swarm_{i:03}")),
//!     ))
//!     .collect();
//! orchestrator.start_staged(profiles).await?;
//!
//! while let Some(notice) = events.recv().await {
//!     tracing::info!(session = %notice.session_id, event = ?notice.event, "lifecycle");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod utils;

pub use auth::{AccountRef, AuthProvider, AuthToken, Authenticator, OfflineAuthenticator};
pub use codec::{PacketFrame, WireCodec};
pub use config::EngineConfig;
pub use error::{
    AuthError, CodecError, ProtocolStateError, Result, SessionError, TranslationError,
    TransportError,
};
pub use protocol::{
    CanonicalPacket, ConnectionState, Direction, PacketKind, ProtocolVersion, RemapTable,
    StageRegistry, TransformStage, TranslationPipeline,
};
pub use session::{
    Orchestrator, SessionEvent, SessionHandle, SessionId, SessionNotice, SessionProfile,
};
pub use transport::{Connector, TcpConnector};
