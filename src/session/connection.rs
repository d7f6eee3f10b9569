//! # Session Connection Task
//!
//! One logical task per session. The task exclusively owns its wire
//! codec, resolved pipeline and state machine — nothing here is shared
//! with any other session except the auth provider's token cache.
//!
//! The task drives the whole lifecycle: connect under the admission
//! permit, `Hello`, login (auth consult, key exchange, compression),
//! configuration, then the `Play` loop answering keepalives, forwarding
//! application packets and draining the outbound command channel in
//! submission order. Suspension points are exactly the socket, the auth
//! provider and cancellation — no operation blocks another session's
//! task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::provider::AuthProvider;
use crate::codec::wire::WireCodec;
use crate::config::EngineConfig;
use crate::error::{Result, SessionError, TransportError};
use crate::protocol::encryption::client_respond;
use crate::protocol::packet::{CanonicalPacket, Direction, PacketKind};
use crate::protocol::pipeline::TranslationPipeline;
use crate::protocol::registry::StageRegistry;
use crate::protocol::state::{ConnectionState, StateMachine};
use crate::session::event::{SessionEvent, SessionNotice};
use crate::session::profile::{SessionId, SessionProfile};
use crate::transport::{BoxedIo, Connector};

/// How long a closing session waits for its goodbye to flush.
const GOODBYE_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything a session task needs, handed over at spawn.
pub(crate) struct SessionContext {
    pub id: SessionId,
    pub profile: SessionProfile,
    pub config: Arc<EngineConfig>,
    pub registry: Arc<StageRegistry>,
    pub auth: Arc<AuthProvider>,
    pub connector: Arc<dyn Connector>,
    /// Admission permits for the connecting phase.
    pub connect_permits: Arc<Semaphore>,
    pub events: mpsc::Sender<SessionNotice>,
    pub cancel: CancellationToken,
    /// Outbound canonical packets submitted by the consumer, drained in
    /// submission order during `Play`.
    pub commands: mpsc::Receiver<CanonicalPacket>,
    /// Optional tap receiving inbound `Play`-state packets.
    pub inbound_tap: Option<mpsc::Sender<CanonicalPacket>>,
}

/// Entry point of the session task: run the lifecycle and report the
/// terminal event. Errors stop here — nothing propagates past the task.
pub(crate) async fn run(mut ctx: SessionContext) {
    let id = ctx.id;
    let events = ctx.events.clone();

    let event = match drive(&mut ctx).await {
        Ok(reason) => {
            info!(session = %id, %reason, "session disconnected");
            SessionEvent::Disconnected { reason }
        }
        Err(error) => {
            warn!(session = %id, %error, "session failed");
            SessionEvent::Failed { error }
        }
    };

    let _ = events
        .send(SessionNotice {
            session_id: id,
            event,
        })
        .await;
}

/// Run one session to its terminal state. Returns the disconnect reason
/// on an orderly end.
async fn drive(ctx: &mut SessionContext) -> Result<String> {
    // Admission control: hold a connecting permit through Handshake and
    // Login so simultaneous handshakes stay bounded.
    let permit = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok("stopped before connect".into()),
        permit = Arc::clone(&ctx.connect_permits).acquire_owned() => {
            permit.map_err(|_| SessionError::Config("engine is shutting down".into()))?
        }
    };

    // Resolved once; reused for every frame of the session.
    let pipeline = ctx.registry.resolve(ctx.profile.protocol_version)?;

    let io = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok("stopped before connect".into()),
        io = ctx.connector.connect(&ctx.profile.address) => io.map_err(SessionError::Transport)?,
    };

    let mut conn = Connection {
        framed: Framed::new(io, WireCodec::new(ctx.config.codec.max_frame_len)),
        machine: StateMachine::new(),
        pipeline,
        metadata: HashMap::new(),
        read_timeout: ctx.config.session.read_timeout(),
        last_activity: Instant::now(),
    };

    // Terminal states release the codec's contexts; they are never
    // reused.
    match lifecycle(ctx, &mut conn, permit).await {
        Ok(reason) => {
            conn.machine.close();
            conn.framed.codec_mut().release();
            Ok(reason)
        }
        Err(err) => {
            conn.machine.fail();
            conn.framed.codec_mut().release();
            Err(err)
        }
    }
}

/// The session's exclusively owned connection state: framed transport,
/// state machine, resolved pipeline and configuration metadata.
struct Connection {
    framed: Framed<BoxedIo, WireCodec>,
    machine: StateMachine,
    pipeline: TranslationPipeline,
    metadata: HashMap<String, String>,
    read_timeout: Duration,
    last_activity: Instant,
}

impl Connection {
    /// Gate, translate and write one outbound canonical packet.
    async fn send(&mut self, packet: CanonicalPacket) -> Result<()> {
        self.machine.on_send(packet.kind())?;
        let frame = self.pipeline.translate_outbound(&packet)?;
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Read and translate one frame, bounded by the inactivity timeout.
    async fn next_packet(&mut self) -> Result<CanonicalPacket> {
        let remaining = self
            .read_timeout
            .checked_sub(self.last_activity.elapsed())
            .unwrap_or(Duration::ZERO);

        let frame = match tokio::time::timeout(remaining, self.framed.next()).await {
            Err(_) => {
                return Err(SessionError::Transport(TransportError::ReadTimeout(
                    self.read_timeout.as_millis() as u64,
                )))
            }
            Ok(None) => return Err(SessionError::Transport(TransportError::Closed)),
            Ok(Some(frame)) => frame?,
        };

        self.last_activity = Instant::now();
        Ok(self.pipeline.translate_inbound(frame)?)
    }
}

async fn lifecycle(
    ctx: &mut SessionContext,
    conn: &mut Connection,
    permit: OwnedSemaphorePermit,
) -> Result<String> {
    conn.send(CanonicalPacket::Hello {
        protocol_version: ctx.profile.protocol_version,
        host: host_of(&ctx.profile.address),
        port: port_of(&ctx.profile.address),
    })
    .await?;

    // Login is where the auth provider is consulted.
    let token = tokio::select! {
        _ = ctx.cancel.cancelled() => return graceful_close(ctx, conn).await,
        token = ctx.auth.token_for(&ctx.profile.account) => token?,
    };

    conn.send(CanonicalPacket::LoginStart {
        username: token.username.clone(),
        account_id: token.account_id,
    })
    .await?;

    // Held until Play, dropped there.
    let mut permit = Some(permit);
    let mut commands_open = true;

    loop {
        let in_play = conn.machine.state() == ConnectionState::Play;

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return graceful_close(ctx, conn).await;
            }

            command = ctx.commands.recv(), if commands_open && in_play => {
                match command {
                    // Outbound packets leave in submission order.
                    Some(packet) => conn.send(packet).await?,
                    None => commands_open = false,
                }
            }

            packet = conn.next_packet() => {
                let packet = packet?;
                conn.machine.on_receive(packet.kind())?;

                if let Some(reason) = handle_inbound(ctx, conn, packet, &mut permit).await? {
                    return Ok(reason);
                }
            }
        }
    }
}

/// React to one inbound canonical packet. Returns `Some(reason)` when the
/// session ended in an orderly way.
async fn handle_inbound(
    ctx: &SessionContext,
    conn: &mut Connection,
    packet: CanonicalPacket,
    permit: &mut Option<OwnedSemaphorePermit>,
) -> Result<Option<String>> {
    match packet {
        CanonicalPacket::EncryptionRequest {
            server_public,
            nonce,
        } => {
            let (client_public, key) = client_respond(server_public, nonce);
            // The response itself still travels plaintext; everything
            // after it is sealed.
            conn.send(CanonicalPacket::EncryptionResponse { client_public })
                .await?;
            conn.framed.codec_mut().enable_encryption(key);
            debug!(session = %ctx.id, "encryption negotiated");
        }

        CanonicalPacket::SetCompression { threshold } => {
            conn.framed
                .codec_mut()
                .enable_compression(threshold as usize);
            debug!(session = %ctx.id, threshold, "compression negotiated");
        }

        CanonicalPacket::LoginSuccess { username, .. } => {
            debug!(session = %ctx.id, %username, "login succeeded");
            conn.send(CanonicalPacket::ClientSettings {
                locale: ctx.profile.locale.clone(),
                view_distance: ctx.profile.view_distance,
            })
            .await?;
        }

        CanonicalPacket::ConfigurationData { key, value } => {
            conn.metadata.insert(key, value);
        }

        CanonicalPacket::FinishConfiguration => {
            conn.send(CanonicalPacket::ConfigurationAck).await?;
            // Established: release the connecting permit and announce.
            permit.take();
            info!(session = %ctx.id, account = %ctx.profile.account, "session connected");
            let _ = ctx
                .events
                .send(SessionNotice {
                    session_id: ctx.id,
                    event: SessionEvent::Connected,
                })
                .await;
        }

        CanonicalPacket::KeepAlive { id } => {
            conn.send(CanonicalPacket::KeepAliveReply { id }).await?;
        }

        CanonicalPacket::Disconnect { reason } => {
            // on_receive already moved the machine to Closed.
            return Ok(Some(reason));
        }

        packet @ (CanonicalPacket::PlayData { .. } | CanonicalPacket::Opaque { .. }) => {
            if let Some(tap) = &ctx.inbound_tap {
                // Forward in arrival order; buffering is the consumer's
                // concern.
                let _ = tap.send(packet).await;
            }
        }

        other => {
            // Legal per the state table but carries nothing to act on.
            debug!(session = %ctx.id, kind = ?other.kind(), "inbound packet ignored");
        }
    }
    Ok(None)
}

/// Best-effort disconnect notification, then an orderly local close.
async fn graceful_close(ctx: &SessionContext, conn: &mut Connection) -> Result<String> {
    if conn
        .machine
        .state()
        .allows(Direction::Serverbound, PacketKind::Goodbye)
    {
        match tokio::time::timeout(GOODBYE_TIMEOUT, conn.send(CanonicalPacket::Goodbye)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(session = %ctx.id, %err, "goodbye not delivered"),
            Err(_) => debug!(session = %ctx.id, "goodbye timed out"),
        }
    }
    Ok("stopped".into())
}

fn host_of(address: &str) -> String {
    address
        .rsplit_once(':')
        .map(|(host, _)| host.to_owned())
        .unwrap_or_else(|| address.to_owned())
}

fn port_of(address: &str) -> u16 {
    address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .unwrap_or(25565)
}
