//! # Connection State Machine
//!
//! Per-session lifecycle, gating which packet kinds are legal at each
//! stage:
//!
//! ```text
//! Handshake ──(send Hello)──→ Login ──(recv LoginSuccess)──→ Configuration
//!                                                                │
//!                                              (send ConfigurationAck)
//!                                                                ▼
//!       Closed ←──(recv Disconnect / graceful close)──────────  Play
//! ```
//!
//! `Failed` is terminal and reachable from any state. Receiving (or
//! attempting to send) a packet kind that is not legal for the current
//! state is a protocol violation: the machine moves to `Failed` and the
//! caller gets a [`ProtocolStateError`] — never a silent drop.

use tracing::debug;

use crate::error::ProtocolStateError;
use crate::protocol::packet::{Direction, PacketKind};

/// The per-session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Connection opened, Hello not yet sent.
    Handshake,
    /// Credentials presented; encryption and compression negotiated here.
    Login,
    /// Session/environment metadata exchange.
    Configuration,
    /// Steady state: application packets flow freely.
    Play,
    /// Orderly end. Codec contexts and the stage chain are released and
    /// never reused.
    Closed,
    /// Terminal error state.
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    /// Whether `kind` may travel in `direction` while in this state.
    ///
    /// Every packet kind has a defined entry for every state; there is no
    /// wildcard fallback on the receive side other than `Opaque`, which is
    /// legal wherever application traffic is.
    pub fn allows(self, direction: Direction, kind: PacketKind) -> bool {
        use PacketKind as K;

        match direction {
            Direction::Serverbound => match self {
                Self::Handshake => matches!(kind, K::Hello),
                Self::Login => matches!(kind, K::LoginStart | K::EncryptionResponse | K::Goodbye),
                Self::Configuration => matches!(
                    kind,
                    K::ClientSettings | K::ConfigurationAck | K::KeepAliveReply | K::Goodbye
                ),
                Self::Play => matches!(
                    kind,
                    K::ClientSettings | K::KeepAliveReply | K::Play | K::Opaque | K::Goodbye
                ),
                Self::Closed | Self::Failed => false,
            },
            Direction::Clientbound => match self {
                Self::Handshake => false,
                Self::Login => matches!(
                    kind,
                    K::EncryptionRequest | K::SetCompression | K::LoginSuccess | K::Disconnect
                ),
                Self::Configuration => matches!(
                    kind,
                    K::ConfigurationData
                        | K::FinishConfiguration
                        | K::KeepAlive
                        | K::Disconnect
                        | K::Opaque
                ),
                Self::Play => matches!(kind, K::KeepAlive | K::Play | K::Disconnect | K::Opaque),
                Self::Closed | Self::Failed => false,
            },
        }
    }
}

/// Drives a [`ConnectionState`] from packet traffic.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Handshake,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, to: ConnectionState) {
        debug!(from = ?self.state, to = ?to, "state transition");
        self.state = to;
    }

    /// Record an inbound packet. Applies the transition its kind drives,
    /// or fails the machine on an out-of-state packet.
    pub fn on_receive(&mut self, kind: PacketKind) -> Result<(), ProtocolStateError> {
        if !self.state.allows(Direction::Clientbound, kind) {
            let err = ProtocolStateError {
                state: self.state,
                kind,
            };
            self.transition(ConnectionState::Failed);
            return Err(err);
        }

        match kind {
            PacketKind::LoginSuccess => self.transition(ConnectionState::Configuration),
            PacketKind::Disconnect => self.transition(ConnectionState::Closed),
            _ => {}
        }
        Ok(())
    }

    /// Record an outbound packet before it is submitted to the pipeline.
    pub fn on_send(&mut self, kind: PacketKind) -> Result<(), ProtocolStateError> {
        if !self.state.allows(Direction::Serverbound, kind) {
            let err = ProtocolStateError {
                state: self.state,
                kind,
            };
            self.transition(ConnectionState::Failed);
            return Err(err);
        }

        match kind {
            PacketKind::Hello => self.transition(ConnectionState::Login),
            PacketKind::ConfigurationAck => self.transition(ConnectionState::Play),
            _ => {}
        }
        Ok(())
    }

    /// Orderly close (local stop or server disconnect already applied).
    pub fn close(&mut self) {
        if !self.state.is_terminal() {
            self.transition(ConnectionState::Closed);
        }
    }

    /// Force the terminal error state.
    pub fn fail(&mut self) {
        if self.state != ConnectionState::Failed {
            self.transition(ConnectionState::Failed);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Walk the happy path to Play.
    fn machine_in_play() -> StateMachine {
        let mut sm = StateMachine::new();
        sm.on_send(PacketKind::Hello).unwrap();
        sm.on_send(PacketKind::LoginStart).unwrap();
        sm.on_receive(PacketKind::EncryptionRequest).unwrap();
        sm.on_send(PacketKind::EncryptionResponse).unwrap();
        sm.on_receive(PacketKind::SetCompression).unwrap();
        sm.on_receive(PacketKind::LoginSuccess).unwrap();
        sm.on_receive(PacketKind::ConfigurationData).unwrap();
        sm.on_send(PacketKind::ClientSettings).unwrap();
        sm.on_receive(PacketKind::FinishConfiguration).unwrap();
        sm.on_send(PacketKind::ConfigurationAck).unwrap();
        sm
    }

    #[test]
    fn test_happy_path_reaches_play() {
        let sm = machine_in_play();
        assert_eq!(sm.state(), ConnectionState::Play);
    }

    #[test]
    fn test_play_packet_during_login_fails_machine() {
        let mut sm = StateMachine::new();
        sm.on_send(PacketKind::Hello).unwrap();

        let err = sm.on_receive(PacketKind::Play).unwrap_err();
        assert_eq!(err.state, ConnectionState::Login);
        assert_eq!(err.kind, PacketKind::Play);
        assert_eq!(sm.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_login_success_during_play_fails_machine() {
        let mut sm = machine_in_play();
        assert!(sm.on_receive(PacketKind::LoginSuccess).is_err());
        assert_eq!(sm.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_disconnect_closes() {
        let mut sm = machine_in_play();
        sm.on_receive(PacketKind::Disconnect).unwrap();
        assert_eq!(sm.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_nothing_legal_after_terminal() {
        let mut sm = machine_in_play();
        sm.close();
        assert!(sm.on_receive(PacketKind::KeepAlive).is_err());

        let mut sm = StateMachine::new();
        sm.fail();
        assert!(sm.on_send(PacketKind::Hello).is_err());
    }

    #[test]
    fn test_every_kind_has_a_defined_entry_per_state() {
        use ConnectionState as S;
        use PacketKind as K;
        let states = [
            S::Handshake,
            S::Login,
            S::Configuration,
            S::Play,
            S::Closed,
            S::Failed,
        ];
        let kinds = [
            K::Hello,
            K::LoginStart,
            K::EncryptionResponse,
            K::ClientSettings,
            K::ConfigurationAck,
            K::KeepAliveReply,
            K::Goodbye,
            K::EncryptionRequest,
            K::SetCompression,
            K::LoginSuccess,
            K::ConfigurationData,
            K::FinishConfiguration,
            K::KeepAlive,
            K::Disconnect,
            K::Play,
            K::Opaque,
        ];
        // The table is total: every (state, direction, kind) returns a
        // verdict without panicking, and terminal states allow nothing.
        for state in states {
            for kind in kinds {
                let sb = state.allows(Direction::Serverbound, kind);
                let cb = state.allows(Direction::Clientbound, kind);
                if state.is_terminal() {
                    assert!(!sb && !cb);
                }
            }
        }
    }

    #[test]
    fn test_opaque_legal_only_with_application_traffic() {
        assert!(ConnectionState::Play.allows(Direction::Clientbound, PacketKind::Opaque));
        assert!(!ConnectionState::Login.allows(Direction::Clientbound, PacketKind::Opaque));
    }
}
