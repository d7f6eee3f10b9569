//! # Wire Codec
//!
//! Frames and unframes the raw byte stream into [`PacketFrame`]s, layered
//! for `tokio_util::codec::Framed`.
//!
//! Wire layout per frame: `[varint length][body]`. Before compression is
//! negotiated the body is `[varint packet id][payload]`. After
//! `SetCompression(threshold)` the body carries a varint uncompressed-length
//! prefix — zero marks a body below the threshold sent raw, nonzero is the
//! true uncompressed length of the lz4 block that follows. After login
//! negotiates a key, the whole body is sealed per frame (nonce prepended).
//!
//! The decoder suspends only at the I/O boundary — insufficient bytes for a
//! full frame — never mid-frame. Any corruption (malformed length, frame
//! over the limit, failed decompression or decryption) is a [`CodecError`]
//! and fatal to the session: framing cannot be trusted afterwards, so the
//! codec is restartable only via a full session reset.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::frame::PacketFrame;
use crate::codec::varint::{peek_varint, read_varint, write_varint};
use crate::config::MAX_FRAME_LEN;
use crate::error::CodecError;
use crate::utils::crypto::Cipher;

/// Compression negotiated during login; fixed afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CompressionContext {
    /// Bodies at or above this many bytes are compressed.
    pub threshold: usize,
}

/// Per-session wire codec.
///
/// Starts in passthrough (no compression, no encryption); login negotiation
/// switches each layer on exactly once via [`enable_compression`] and
/// [`enable_encryption`]. The contexts are never replaced or reused across
/// sessions.
///
/// [`enable_compression`]: WireCodec::enable_compression
/// [`enable_encryption`]: WireCodec::enable_encryption
#[derive(Debug)]
pub struct WireCodec {
    max_frame_len: usize,
    compression: Option<CompressionContext>,
    encryption: Option<Cipher>,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl WireCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            compression: None,
            encryption: None,
        }
    }

    /// Switch on compression with the server-negotiated threshold.
    pub fn enable_compression(&mut self, threshold: usize) {
        debug_assert!(self.compression.is_none(), "compression negotiated twice");
        self.compression = Some(CompressionContext { threshold });
    }

    /// Switch on encryption with the session key derived during login.
    pub fn enable_encryption(&mut self, key: [u8; 32]) {
        debug_assert!(self.encryption.is_none(), "encryption negotiated twice");
        self.encryption = Some(Cipher::new(key));
    }

    pub fn compression(&self) -> Option<CompressionContext> {
        self.compression
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Release the negotiated contexts. Called when the session reaches a
    /// terminal state; the codec must not be used afterwards.
    pub fn release(&mut self) {
        self.compression = None;
        self.encryption = None;
    }

    fn unwrap_body(&self, mut body: BytesMut) -> Result<PacketFrame, CodecError> {
        if let Some(cipher) = &self.encryption {
            let plain = cipher.open(&body)?;
            body = BytesMut::from(&plain[..]);
        }

        if self.compression.is_some() {
            let data_len = read_varint(&mut body)? as usize;
            if data_len > 0 {
                if data_len > self.max_frame_len {
                    return Err(CodecError::DecompressionBomb(data_len, self.max_frame_len));
                }
                let decompressed = lz4_flex::block::decompress(&body, data_len)
                    .map_err(|_| CodecError::DecompressionFailure)?;
                if decompressed.len() != data_len {
                    return Err(CodecError::DecompressionFailure);
                }
                body = BytesMut::from(&decompressed[..]);
            }
        }

        let id = read_varint(&mut body)?;
        Ok(PacketFrame {
            id,
            payload: body.freeze(),
        })
    }

    fn wrap_body(&self, frame: &PacketFrame) -> Result<Vec<u8>, CodecError> {
        let plain = frame.to_body();

        let mut body: Vec<u8> = match self.compression {
            Some(ctx) if plain.len() >= ctx.threshold => {
                let compressed = lz4_flex::block::compress(&plain);
                let mut out = Vec::with_capacity(compressed.len() + 5);
                write_varint(&mut out, plain.len() as u32);
                out.extend_from_slice(&compressed);
                out
            }
            Some(_) => {
                // Below threshold: zero marker, raw body.
                let mut out = Vec::with_capacity(plain.len() + 1);
                out.push(0);
                out.extend_from_slice(&plain);
                out
            }
            None => plain.to_vec(),
        };

        if let Some(cipher) = &self.encryption {
            body = cipher.seal(&body)?;
        }

        Ok(body)
    }
}

impl Decoder for WireCodec {
    type Item = PacketFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PacketFrame>, CodecError> {
        let (length, prefix_len) = match peek_varint(src)? {
            Some(v) => v,
            None => return Ok(None),
        };
        let length = length as usize;

        if length > self.max_frame_len {
            return Err(CodecError::OversizedFrame(length, self.max_frame_len));
        }

        if src.len() < prefix_len + length {
            // Suspend at the I/O boundary, never mid-frame.
            src.reserve(prefix_len + length - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        let body = src.split_to(length);
        let frame = self.unwrap_body(body)?;
        trace!(id = frame.id, bytes = frame.payload.len(), "frame decoded");
        Ok(Some(frame))
    }
}

impl Encoder<PacketFrame> for WireCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: PacketFrame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = self.wrap_body(&frame)?;

        if body.len() > self.max_frame_len {
            return Err(CodecError::OversizedFrame(body.len(), self.max_frame_len));
        }

        dst.reserve(body.len() + 5);
        write_varint(dst, body.len() as u32);
        dst.put_slice(&body);
        trace!(id = frame.id, bytes = body.len(), "frame encoded");
        Ok(())
    }
}
