//! TCP connector.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{BoxedIo, Connector};
use crate::utils::timeout::with_connect_timeout;

/// Connects plain TCP streams with a bounded connect timeout.
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> Result<BoxedIo, TransportError> {
        let stream = with_connect_timeout(
            async { TcpStream::connect(addr).await.map_err(TransportError::Connect) },
            self.connect_timeout,
        )
        .await?;

        // Frames are small and latency-sensitive; never batch them.
        stream.set_nodelay(true).map_err(TransportError::Connect)?;

        debug!(%addr, "tcp connected");
        Ok(Box::new(stream))
    }
}
