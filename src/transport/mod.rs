//! Byte-stream transport seam.
//!
//! Sessions never open sockets themselves: they ask a [`Connector`] for a
//! boxed duplex stream and layer the wire codec on top. Production uses
//! [`TcpConnector`]; test harnesses substitute in-memory duplex pairs.

pub mod tcp;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// Object-safe duplex byte stream.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A connected, ready-to-frame byte stream.
pub type BoxedIo = Box<dyn Io>;

/// Opens byte streams toward a server address.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `addr` (`host:port`).
    async fn connect(&self, addr: &str) -> Result<BoxedIo, TransportError>;
}

pub use tcp::TcpConnector;
