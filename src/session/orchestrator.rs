//! # Session Orchestrator
//!
//! Creates, schedules, monitors and tears down many concurrent sessions.
//!
//! - **Admission control**: a semaphore bounds how many sessions are
//!   simultaneously in Handshake/Login, independent of the cap on
//!   established sessions.
//! - **Staged startup**: `start_staged` paces session starts through a
//!   jittered join-delay window instead of connecting everything at once.
//! - **Failure isolation**: a session entering `Failed` only reports an
//!   event; the orchestrator and every other session keep running.
//! - **Teardown**: `stop`/`stop_all` signal a graceful close and force
//!   teardown after a bounded timeout — never an indefinite wait, even
//!   when a session is unresponsive.
//!
//! ## Usage
//! ```ignore
//! let mut orchestrator = Orchestrator::new(config, registry, auth, connector);
//! let mut events = orchestrator.take_events().unwrap();
//! let handle = orchestrator.start(profile)?;
//! while let Some(notice) = events.recv().await {
//!     println!("{}: {:?}", notice.session_id, notice.event);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::provider::AuthProvider;
use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::protocol::packet::CanonicalPacket;
use crate::protocol::registry::StageRegistry;
use crate::session::connection::{self, SessionContext};
use crate::session::event::SessionNotice;
use crate::session::profile::{SessionId, SessionProfile};
use crate::transport::Connector;

/// Capacity of each session's outbound command channel.
const COMMAND_BUFFER: usize = 64;

/// Cheap, cloneable reference to a live session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
    commands: mpsc::Sender<CanonicalPacket>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Submit an outbound canonical packet. Packets are written to the
    /// wire in submission order once the session is in `Play`.
    pub async fn submit(&self, packet: CanonicalPacket) -> Result<()> {
        self.commands
            .send(packet)
            .await
            .map_err(|_| SessionError::Config(format!("session {} is gone", self.id)))
    }

    /// Signal a graceful close without waiting for teardown. The session
    /// task unregisters itself once closed; use [`Orchestrator::stop`]
    /// for a bounded wait.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }
}

/// Samples how many sessions hold a connecting permit right now.
#[derive(Clone)]
pub struct ConnectingProbe {
    max_connecting: usize,
    permits: Arc<Semaphore>,
}

impl ConnectingProbe {
    pub fn connecting(&self) -> usize {
        self.max_connecting - self.permits.available_permits()
    }
}

/// A live session as the orchestrator tracks it.
struct LiveSession {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owns every session. All session state is owned by session tasks; the
/// orchestrator holds only handles, the admission semaphore and the event
/// channel.
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    registry: Arc<StageRegistry>,
    auth: Arc<AuthProvider>,
    connector: Arc<dyn Connector>,
    connect_permits: Arc<Semaphore>,
    sessions: Arc<Mutex<HashMap<SessionId, LiveSession>>>,
    events_tx: mpsc::Sender<SessionNotice>,
    events_rx: Option<mpsc::Receiver<SessionNotice>>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        registry: Arc<StageRegistry>,
        auth: Arc<AuthProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.orchestrator.event_buffer);
        let connect_permits = Arc::new(Semaphore::new(config.orchestrator.max_connecting));
        Self {
            config: Arc::new(config),
            registry,
            auth,
            connector,
            connect_permits,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// The lifecycle event stream. Yields once; the caller owns the
    /// receiver from then on.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionNotice>> {
        self.events_rx.take()
    }

    /// Live sessions (any non-terminal state).
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Sessions currently holding a connecting permit, i.e. in
    /// Handshake/Login.
    pub fn connecting_count(&self) -> usize {
        self.config.orchestrator.max_connecting - self.connect_permits.available_permits()
    }

    /// Cheap cloneable view of the admission state, for dashboards and
    /// tests sampling from another task.
    pub fn connecting_probe(&self) -> ConnectingProbe {
        ConnectingProbe {
            max_connecting: self.config.orchestrator.max_connecting,
            permits: Arc::clone(&self.connect_permits),
        }
    }

    /// Start one session immediately.
    ///
    /// # Errors
    /// [`SessionError::Config`] when the established-session cap is
    /// reached. Everything that can go wrong *inside* the session is
    /// reported through the event stream instead, keeping failures
    /// isolated per session.
    pub async fn start(&self, profile: SessionProfile) -> Result<SessionHandle> {
        self.start_inner(profile, None).await
    }

    /// Start a session whose inbound `Play`-state packets are forwarded,
    /// in arrival order, to `tap`. A full tap applies backpressure to the
    /// session rather than dropping packets.
    pub async fn start_tapped(
        &self,
        profile: SessionProfile,
        tap: mpsc::Sender<CanonicalPacket>,
    ) -> Result<SessionHandle> {
        self.start_inner(profile, Some(tap)).await
    }

    async fn start_inner(
        &self,
        profile: SessionProfile,
        inbound_tap: Option<mpsc::Sender<CanonicalPacket>>,
    ) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= self.config.orchestrator.max_sessions {
            return Err(SessionError::Config(format!(
                "session limit of {} reached",
                self.config.orchestrator.max_sessions
            )));
        }

        let id = SessionId::generate();
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let ctx = SessionContext {
            id,
            profile,
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            auth: Arc::clone(&self.auth),
            connector: Arc::clone(&self.connector),
            connect_permits: Arc::clone(&self.connect_permits),
            events: self.events_tx.clone(),
            cancel: cancel.clone(),
            commands: commands_rx,
            inbound_tap,
        };

        // The task unregisters itself on exit. Holding the registry lock
        // across spawn+insert means the removal can never precede the
        // insertion.
        let sessions_ref = Arc::clone(&self.sessions);
        let join = tokio::spawn(async move {
            connection::run(ctx).await;
            sessions_ref.lock().await.remove(&id);
        });

        sessions.insert(
            id,
            LiveSession {
                cancel: cancel.clone(),
                join,
            },
        );
        debug!(session = %id, "session started");

        Ok(SessionHandle {
            id,
            cancel,
            commands: commands_tx,
        })
    }

    /// Start many sessions at a staged, jittered rate.
    ///
    /// Pacing models realistic load instead of a thundering herd: between
    /// consecutive starts the orchestrator sleeps a uniformly random
    /// delay from the configured join-delay window. Returns the handles
    /// of every session that was started.
    pub async fn start_staged(&self, profiles: Vec<SessionProfile>) -> Result<Vec<SessionHandle>> {
        let total = profiles.len();
        info!(sessions = total, "staged startup beginning");

        let mut handles = Vec::with_capacity(total);
        for (index, profile) in profiles.into_iter().enumerate() {
            handles.push(self.start(profile).await?);

            if index + 1 < total {
                let delay = {
                    let o = &self.config.orchestrator;
                    let mut rng = rand::rng();
                    rng.random_range(o.join_delay_min_ms..=o.join_delay_max_ms)
                };
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
        Ok(handles)
    }

    /// Stop one session: graceful close attempt, then forced teardown
    /// after the configured timeout. Safe to call from outside the
    /// session's task in any state; idempotent once the session is gone.
    pub async fn stop(&self, handle: &SessionHandle) {
        let live = self.sessions.lock().await.remove(&handle.id);
        let Some(live) = live else { return };
        Self::teardown(handle.id, live, self.config.orchestrator.stop_timeout()).await;
    }

    /// Stop every live session. Completes even if individual sessions are
    /// unresponsive: teardown is forced after the stop timeout.
    pub async fn stop_all(&self) {
        let drained: Vec<(SessionId, LiveSession)> =
            self.sessions.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(sessions = drained.len(), "stopping all sessions");

        // Signal everyone first so closes proceed concurrently...
        for (_, live) in &drained {
            live.cancel.cancel();
        }

        // ...then reap with a bounded wait each.
        let timeout = self.config.orchestrator.stop_timeout();
        let reapers = drained
            .into_iter()
            .map(|(id, live)| Self::teardown(id, live, timeout));
        futures::future::join_all(reapers).await;

        info!("all sessions stopped");
    }

    async fn teardown(id: SessionId, live: LiveSession, timeout: std::time::Duration) {
        live.cancel.cancel();
        let abort = live.join.abort_handle();
        match tokio::time::timeout(timeout, live.join).await {
            Ok(_) => debug!(session = %id, "session exited gracefully"),
            Err(_) => {
                warn!(session = %id, "session unresponsive, forcing teardown");
                abort.abort();
            }
        }
    }
}
