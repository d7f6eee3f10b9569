//! The unit the wire codec produces and consumes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::varint::{varint_len, write_varint};

/// One length-delimited packet as it exists at a single protocol version:
/// a packet id and its raw payload bytes.
///
/// Frames are transient: one is created per inbound/outbound message and
/// has no identity beyond its position in the session's stream. Payloads
/// are `Bytes` so pipeline stages that only remap ids never copy them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFrame {
    /// Packet id, meaningful only at this frame's protocol version.
    pub id: u32,
    /// Raw payload bytes after the id.
    pub payload: Bytes,
}

impl PacketFrame {
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Serialized body length: varint id plus payload.
    pub fn body_len(&self) -> usize {
        varint_len(self.id) + self.payload.len()
    }

    /// Write `[varint id][payload]` into a fresh buffer.
    pub fn to_body(&self) -> BytesMut {
        let mut body = BytesMut::with_capacity(self.body_len());
        write_varint(&mut body, self.id);
        body.put_slice(&self.payload);
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_layout() {
        let frame = PacketFrame::new(0x07, vec![0x01, 0x02, 0x03]);
        assert_eq!(frame.body_len(), 4);
        assert_eq!(&frame.to_body()[..], &[0x07, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_multibyte_id() {
        let frame = PacketFrame::new(300, Vec::new());
        assert_eq!(&frame.to_body()[..], &[0xAC, 0x02]);
    }
}
