//! Shared test harness: an in-memory connector whose server side speaks
//! the scripted peer protocol at a configurable version.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

use swarmlink::codec::varint::write_varint;
use swarmlink::codec::WireCodec;
use swarmlink::error::{Result, SessionError, TransportError};
use swarmlink::protocol::encryption::ServerKeyExchange;
use swarmlink::protocol::{
    CanonicalPacket, Direction, ProtocolVersion, StageRegistry, TranslationPipeline,
};
use swarmlink::transport::{BoxedIo, Connector};

/// What the scripted server does with each connection.
#[derive(Clone)]
pub struct ServerBehavior {
    /// Wire version the server speaks.
    pub version: ProtocolVersion,
    pub compression_threshold: Option<u32>,
    pub encrypt: bool,
    pub config_entries: Vec<(String, String)>,
    /// Dwell time between LoginStart and the rest of login; keeps
    /// sessions countable in the connecting phase.
    pub hold_in_login: Duration,
    /// Send keepalives at this interval once in Play.
    pub keepalive_every: Option<Duration>,
    /// Disconnect with the reason after this many correct keepalive
    /// echoes.
    pub kick_after_keepalives: Option<(u32, String)>,
    /// Disconnect with the reason immediately after entering Play.
    pub kick_on_play: Option<String>,
    /// Inject a corrupted compressed frame in Play for this username.
    pub corrupt_for_account: Option<String>,
    /// Send this many PlayData packets immediately after entering Play.
    pub play_burst: usize,
    /// Misbehave: repeat LoginSuccess once the session is in Play.
    pub resend_login_success_in_play: bool,
    /// Echo inbound PlayData back to the client.
    pub echo_play_data: bool,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::CANONICAL,
            compression_threshold: Some(64),
            encrypt: true,
            config_entries: vec![("motd".into(), "scripted peer".into())],
            hold_in_login: Duration::ZERO,
            keepalive_every: None,
            kick_after_keepalives: None,
            kick_on_play: None,
            corrupt_for_account: None,
            play_burst: 0,
            resend_login_success_in_play: false,
            echo_play_data: true,
        }
    }
}

/// Connector producing duplex pairs served by [`ServerBehavior`].
pub struct MemoryConnector {
    behavior: ServerBehavior,
    registry: Arc<StageRegistry>,
}

impl MemoryConnector {
    pub fn new(behavior: ServerBehavior, registry: Arc<StageRegistry>) -> Self {
        Self { behavior, registry }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _addr: &str) -> std::result::Result<BoxedIo, TransportError> {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let behavior = self.behavior.clone();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            // Sessions tear down mid-conversation all the time; the
            // server half just stops serving.
            let _ = serve(server_io, behavior, registry).await;
        });
        Ok(Box::new(client_io))
    }
}

type ServerFramed = Framed<DuplexStream, WireCodec>;

async fn recv(
    framed: &mut ServerFramed,
    pipeline: &TranslationPipeline,
) -> Result<CanonicalPacket> {
    let frame = match framed.next().await {
        None => return Err(SessionError::Transport(TransportError::Closed)),
        Some(frame) => frame?,
    };
    Ok(pipeline.lift(Direction::Serverbound, frame)?)
}

async fn send(
    framed: &mut ServerFramed,
    pipeline: &TranslationPipeline,
    packet: CanonicalPacket,
) -> Result<()> {
    let frame = pipeline.lower(Direction::Clientbound, &packet)?;
    framed.send(frame).await?;
    Ok(())
}

/// Drive the server side of one connection.
async fn serve(
    io: DuplexStream,
    behavior: ServerBehavior,
    registry: Arc<StageRegistry>,
) -> Result<()> {
    let pipeline = registry.resolve(behavior.version)?;
    let mut framed = Framed::new(io, WireCodec::default());

    // Handshake
    let CanonicalPacket::Hello {
        protocol_version, ..
    } = recv(&mut framed, &pipeline).await?
    else {
        return Ok(());
    };
    assert_eq!(protocol_version, behavior.version, "client spoke the wrong version");

    // Login
    let CanonicalPacket::LoginStart {
        username,
        account_id,
    } = recv(&mut framed, &pipeline).await?
    else {
        return Ok(());
    };

    tokio::time::sleep(behavior.hold_in_login).await;

    if behavior.encrypt {
        let (exchange, server_public, nonce) = ServerKeyExchange::initiate();
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::EncryptionRequest {
                server_public,
                nonce,
            },
        )
        .await?;
        let CanonicalPacket::EncryptionResponse { client_public } =
            recv(&mut framed, &pipeline).await?
        else {
            return Ok(());
        };
        framed
            .codec_mut()
            .enable_encryption(exchange.finalize(client_public));
    }

    if let Some(threshold) = behavior.compression_threshold {
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::SetCompression { threshold },
        )
        .await?;
        framed.codec_mut().enable_compression(threshold as usize);
    }

    send(
        &mut framed,
        &pipeline,
        CanonicalPacket::LoginSuccess {
            account_id,
            username: username.clone(),
        },
    )
    .await?;

    // Configuration
    let CanonicalPacket::ClientSettings { .. } = recv(&mut framed, &pipeline).await? else {
        return Ok(());
    };
    for (key, value) in &behavior.config_entries {
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::ConfigurationData {
                key: key.clone(),
                value: value.clone(),
            },
        )
        .await?;
    }
    send(&mut framed, &pipeline, CanonicalPacket::FinishConfiguration).await?;
    let CanonicalPacket::ConfigurationAck = recv(&mut framed, &pipeline).await? else {
        return Ok(());
    };

    // Play
    if behavior.corrupt_for_account.as_deref() == Some(username.as_str()) {
        inject_corrupt_frame(framed.get_mut()).await?;
        return Ok(());
    }

    if let Some(reason) = &behavior.kick_on_play {
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::Disconnect {
                reason: reason.clone(),
            },
        )
        .await?;
        return Ok(());
    }

    if behavior.resend_login_success_in_play {
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::LoginSuccess {
                account_id,
                username: username.clone(),
            },
        )
        .await?;
    }

    for i in 0..behavior.play_burst {
        send(
            &mut framed,
            &pipeline,
            CanonicalPacket::PlayData {
                data: vec![i as u8].into(),
            },
        )
        .await?;
    }

    let mut keepalive_seq: u64 = 0;
    let mut echoed: u32 = 0;
    let mut ticker = tokio::time::interval(
        behavior
            .keepalive_every
            .unwrap_or(Duration::from_secs(3600)),
    );
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            _ = ticker.tick(), if behavior.keepalive_every.is_some() => {
                keepalive_seq += 1;
                send(&mut framed, &pipeline, CanonicalPacket::KeepAlive { id: keepalive_seq })
                    .await?;
            }

            packet = recv(&mut framed, &pipeline) => {
                match packet {
                    Err(_) => return Ok(()),
                    Ok(CanonicalPacket::Goodbye) => return Ok(()),
                    Ok(CanonicalPacket::KeepAliveReply { id }) => {
                        assert_eq!(id, keepalive_seq, "keepalive echoed out of order");
                        echoed += 1;
                        if let Some((after, reason)) = &behavior.kick_after_keepalives {
                            if echoed >= *after {
                                send(&mut framed, &pipeline, CanonicalPacket::Disconnect {
                                    reason: reason.clone(),
                                }).await?;
                                return Ok(());
                            }
                        }
                    }
                    Ok(CanonicalPacket::PlayData { data }) if behavior.echo_play_data => {
                        send(&mut framed, &pipeline, CanonicalPacket::PlayData { data }).await?;
                    }
                    Ok(_) => {}
                }
            }
        }
    }
}

/// Write a frame whose compressed block is garbage, straight past the
/// encoder. Only meaningful against a compressing, unencrypted session.
async fn inject_corrupt_frame(io: &mut DuplexStream) -> Result<()> {
    let mut body = BytesMut::new();
    write_varint(&mut body, 512); // claims 512 uncompressed bytes
    body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11, 0x22, 0x33]);

    let mut frame = BytesMut::new();
    write_varint(&mut frame, body.len() as u32);
    frame.extend_from_slice(&body);

    io.write_all(&frame).await.map_err(TransportError::Io)?;
    io.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

/// Registry with the stock two-stage chain 758 → 759 → 760 used by
/// version tests: keepalive ids shift across the pairs, everything else
/// keeps its id.
pub fn shifted_registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry
        .load_tables(
            r#"[
                {
                    "older": 758, "newer": 759,
                    "clientbound": [{"older": 21, "newer": 37}],
                    "serverbound": [{"older": 21, "newer": 37}]
                },
                {
                    "older": 759, "newer": 760,
                    "clientbound": [{"older": 37, "newer": 5}],
                    "serverbound": [{"older": 37, "newer": 5}]
                }
            ]"#,
        )
        .expect("stock tables parse");
    registry
}
