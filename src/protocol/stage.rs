//! # Transform Stages
//!
//! A [`TransformStage`] rewrites packets between one adjacent pair of
//! protocol versions, in both directions. Stages are stateless apart from
//! their mapping tables, which are versioned, read-only data — so a stage
//! can be shared by every session crossing its version pair without
//! locking.
//!
//! Concrete per-version packet tables are collaborator-supplied data, not
//! engine code: [`RemapTable`] is the serde-loadable form, and
//! [`TableStage`] executes one mechanically. Behavior beyond what a table
//! can express (structural payload rewrites) is done by implementing
//! [`TransformStage`] directly.

use serde::{Deserialize, Serialize};

use crate::codec::frame::PacketFrame;
use crate::error::TranslationError;
use crate::protocol::packet::Direction;
use crate::protocol::version::ProtocolVersion;

/// A bidirectional packet rewriter bound to one adjacent version pair.
///
/// `upgrade` carries a frame from `older` to `newer`; `downgrade` the
/// reverse. Stages must not assume any other stage's internal state:
/// the packet representation is the only channel between them.
pub trait TransformStage: Send + Sync {
    fn older(&self) -> ProtocolVersion;
    fn newer(&self) -> ProtocolVersion;

    fn upgrade(
        &self,
        direction: Direction,
        frame: PacketFrame,
    ) -> Result<PacketFrame, TranslationError>;

    fn downgrade(
        &self,
        direction: Direction,
        frame: PacketFrame,
    ) -> Result<PacketFrame, TranslationError>;
}

/// One id correspondence between the older and newer version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdRemap {
    pub older: u32,
    pub newer: u32,
}

/// A newer-side id whose loss would be unsafe.
///
/// Downgrading a frame with this id when the table has no mapping for it
/// raises [`TranslationError::Unrepresentable`] instead of passing it
/// through: silently forwarding it would hand the older server a packet it
/// will misparse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequiredId {
    pub direction: WireDirection,
    pub id: u32,
}

/// A documented lossy mapping: when downgrading the named packet, the
/// bytes at `offset..offset + default.len()` are overwritten with the
/// older version's legal default. The clamp policy for each field is
/// defined by the table author, not the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldClamp {
    pub direction: WireDirection,
    /// Packet id at the newer version.
    pub id: u32,
    pub offset: usize,
    pub default: Vec<u8>,
}

/// Serde-friendly mirror of [`Direction`] for table data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireDirection {
    Serverbound,
    Clientbound,
}

impl From<Direction> for WireDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Serverbound => WireDirection::Serverbound,
            Direction::Clientbound => WireDirection::Clientbound,
        }
    }
}

/// Versioned, read-only mapping data for one adjacent version pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapTable {
    pub older: ProtocolVersion,
    pub newer: ProtocolVersion,

    /// Id correspondences for clientbound packets.
    #[serde(default)]
    pub clientbound: Vec<IdRemap>,

    /// Id correspondences for serverbound packets.
    #[serde(default)]
    pub serverbound: Vec<IdRemap>,

    /// Newer-side ids that must not be silently lost on downgrade.
    #[serde(default)]
    pub required: Vec<RequiredId>,

    /// Lossy-field defaults applied on downgrade.
    #[serde(default)]
    pub clamps: Vec<FieldClamp>,
}

impl RemapTable {
    fn remaps(&self, direction: Direction) -> &[IdRemap] {
        match direction {
            Direction::Serverbound => &self.serverbound,
            Direction::Clientbound => &self.clientbound,
        }
    }

    fn is_required(&self, direction: Direction, id: u32) -> bool {
        let direction = WireDirection::from(direction);
        self.required
            .iter()
            .any(|r| r.direction == direction && r.id == id)
    }
}

/// Executes a [`RemapTable`]: id remapping with opaque passthrough for
/// unknown ids, required-id enforcement and clamp application on
/// downgrade.
pub struct TableStage {
    table: RemapTable,
}

impl TableStage {
    pub fn new(table: RemapTable) -> Self {
        Self { table }
    }

    /// Parse one table from its JSON data form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    fn apply_clamps(&self, direction: Direction, frame: &mut PacketFrame, newer_id: u32) {
        let direction = WireDirection::from(direction);
        for clamp in &self.table.clamps {
            if clamp.direction != direction || clamp.id != newer_id {
                continue;
            }
            let end = clamp.offset + clamp.default.len();
            if frame.payload.len() < end {
                continue;
            }
            let mut payload = frame.payload.to_vec();
            payload[clamp.offset..end].copy_from_slice(&clamp.default);
            frame.payload = payload.into();
        }
    }
}

impl TransformStage for TableStage {
    fn older(&self) -> ProtocolVersion {
        self.table.older
    }

    fn newer(&self) -> ProtocolVersion {
        self.table.newer
    }

    fn upgrade(
        &self,
        direction: Direction,
        mut frame: PacketFrame,
    ) -> Result<PacketFrame, TranslationError> {
        if let Some(remap) = self
            .table
            .remaps(direction)
            .iter()
            .find(|r| r.older == frame.id)
        {
            frame.id = remap.newer;
        }
        // Unknown ids pass through untranslated, never dropped.
        Ok(frame)
    }

    fn downgrade(
        &self,
        direction: Direction,
        mut frame: PacketFrame,
    ) -> Result<PacketFrame, TranslationError> {
        let newer_id = frame.id;
        match self
            .table
            .remaps(direction)
            .iter()
            .find(|r| r.newer == newer_id)
        {
            Some(remap) => frame.id = remap.older,
            None if self.table.is_required(direction, newer_id) => {
                return Err(TranslationError::Unrepresentable {
                    id: newer_id,
                    version: self.table.older,
                });
            }
            None => {}
        }
        self.apply_clamps(direction, &mut frame, newer_id);
        Ok(frame)
    }
}
