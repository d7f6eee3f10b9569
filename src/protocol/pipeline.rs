//! # Translation Pipeline
//!
//! The per-session, resolved, immutable stage chain. Inbound frames run
//! every stage from the server's version to the canonical version and
//! decode into a [`CanonicalPacket`]; outbound canonical packets encode
//! and run the chain in reverse. Each stage is applied independently —
//! stages communicate only through the frame they hand each other.
//!
//! The chain is role-agnostic: a client lifts clientbound frames and
//! lowers serverbound ones, a server-side harness does the opposite. The
//! [`translate_inbound`]/[`translate_outbound`] pair is the client role;
//! [`lift`]/[`lower`] expose the same chain keyed by travel direction.
//!
//! [`translate_inbound`]: TranslationPipeline::translate_inbound
//! [`translate_outbound`]: TranslationPipeline::translate_outbound
//! [`lift`]: TranslationPipeline::lift
//! [`lower`]: TranslationPipeline::lower

use std::sync::Arc;

use crate::codec::frame::PacketFrame;
use crate::error::TranslationError;
use crate::protocol::packet::{CanonicalPacket, Direction};
use crate::protocol::stage::TransformStage;
use crate::protocol::version::ProtocolVersion;

/// Resolved stage chain for one session. Resolution happens once, at
/// session start; the chain is reused for every frame and dropped with
/// the session.
pub struct TranslationPipeline {
    server_version: ProtocolVersion,
    /// Stages ordered from the server's version toward canonical.
    chain: Vec<Arc<dyn TransformStage>>,
}

impl std::fmt::Debug for TranslationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationPipeline")
            .field("server_version", &self.server_version)
            .field("stage_count", &self.chain.len())
            .finish()
    }
}

impl TranslationPipeline {
    pub(crate) fn new(
        server_version: ProtocolVersion,
        chain: Vec<Arc<dyn TransformStage>>,
    ) -> Self {
        Self {
            server_version,
            chain,
        }
    }

    pub fn server_version(&self) -> ProtocolVersion {
        self.server_version
    }

    pub fn stage_count(&self) -> usize {
        self.chain.len()
    }

    /// True when the chain climbs the version axis toward canonical
    /// (server older than canonical).
    fn ascending(&self) -> bool {
        self.server_version < ProtocolVersion::CANONICAL
    }

    /// Carry a server-version frame to the canonical version and decode
    /// it. `direction` is the frame's direction of travel.
    pub fn lift(
        &self,
        direction: Direction,
        mut frame: PacketFrame,
    ) -> Result<CanonicalPacket, TranslationError> {
        let ascending = self.ascending();
        for stage in &self.chain {
            frame = if ascending {
                stage.upgrade(direction, frame)?
            } else {
                stage.downgrade(direction, frame)?
            };
        }
        CanonicalPacket::decode(direction, &frame).map_err(|_| TranslationError::Unrepresentable {
            id: frame.id,
            version: ProtocolVersion::CANONICAL,
        })
    }

    /// Encode a canonical packet and carry it down to the server's
    /// version. `direction` is the packet's direction of travel.
    pub fn lower(
        &self,
        direction: Direction,
        packet: &CanonicalPacket,
    ) -> Result<PacketFrame, TranslationError> {
        let mut frame = packet.encode();
        let ascending = self.ascending();
        for stage in self.chain.iter().rev() {
            frame = if ascending {
                stage.downgrade(direction, frame)?
            } else {
                stage.upgrade(direction, frame)?
            };
        }
        Ok(frame)
    }

    /// Client role: server-version clientbound frame → canonical packet.
    pub fn translate_inbound(
        &self,
        frame: PacketFrame,
    ) -> Result<CanonicalPacket, TranslationError> {
        self.lift(Direction::Clientbound, frame)
    }

    /// Client role: canonical packet → server-version serverbound frame.
    pub fn translate_outbound(
        &self,
        packet: &CanonicalPacket,
    ) -> Result<PacketFrame, TranslationError> {
        self.lower(Direction::Serverbound, packet)
    }
}
