//! Wire-level framing: varints, packet frames and the session codec.

pub mod frame;
pub mod varint;
pub mod wire;

pub use frame::PacketFrame;
pub use wire::{CompressionContext, WireCodec};
