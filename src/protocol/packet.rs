//! # Canonical Packets
//!
//! The engine's internal, version-independent packet representation.
//!
//! Inbound frames are translated to the canonical version by the pipeline
//! and decoded here; outbound canonical packets are encoded here and
//! translated down to the server's version. Packet ids below are ids *at
//! the canonical version* — older versions may number them differently,
//! which is exactly what transform stages rewrite.
//!
//! Unknown ids decode to [`CanonicalPacket::Opaque`] and are never dropped:
//! a packet the engine does not understand still flows to Play-state
//! consumers as raw bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::codec::frame::PacketFrame;
use crate::codec::varint::{read_varint, write_varint};
use crate::error::CodecError;
use crate::protocol::version::ProtocolVersion;

/// Longest accepted string field, in bytes.
const MAX_STRING_LEN: usize = 32_767;

/// Which peer a packet travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → server
    Serverbound,
    /// Server → client
    Clientbound,
}

/// Canonical ids, serverbound.
pub mod serverbound {
    pub const HELLO: u32 = 0x00;
    pub const LOGIN_START: u32 = 0x01;
    pub const ENCRYPTION_RESPONSE: u32 = 0x02;
    pub const CLIENT_SETTINGS: u32 = 0x03;
    pub const CONFIGURATION_ACK: u32 = 0x04;
    pub const KEEP_ALIVE_REPLY: u32 = 0x05;
    pub const GOODBYE: u32 = 0x06;
    pub const PLAY_DATA: u32 = 0x07;
}

/// Canonical ids, clientbound.
pub mod clientbound {
    pub const ENCRYPTION_REQUEST: u32 = 0x00;
    pub const SET_COMPRESSION: u32 = 0x01;
    pub const LOGIN_SUCCESS: u32 = 0x02;
    pub const CONFIGURATION_DATA: u32 = 0x03;
    pub const FINISH_CONFIGURATION: u32 = 0x04;
    pub const KEEP_ALIVE: u32 = 0x05;
    pub const DISCONNECT: u32 = 0x06;
    pub const PLAY_DATA: u32 = 0x07;
}

/// Version-independent structured packet, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalPacket {
    // -- serverbound -----------------------------------------------------
    /// Opens the connection: the version the client intends to speak and
    /// the endpoint it believes it is talking to.
    Hello {
        protocol_version: ProtocolVersion,
        host: String,
        port: u16,
    },
    LoginStart {
        username: String,
        account_id: Uuid,
    },
    EncryptionResponse {
        client_public: [u8; 32],
    },
    ClientSettings {
        locale: String,
        view_distance: u8,
    },
    ConfigurationAck,
    KeepAliveReply {
        id: u64,
    },
    /// Best-effort disconnect notification sent during graceful close.
    Goodbye,

    // -- clientbound -----------------------------------------------------
    EncryptionRequest {
        server_public: [u8; 32],
        nonce: [u8; 16],
    },
    SetCompression {
        threshold: u32,
    },
    LoginSuccess {
        account_id: Uuid,
        username: String,
    },
    ConfigurationData {
        key: String,
        value: String,
    },
    FinishConfiguration,
    KeepAlive {
        id: u64,
    },
    Disconnect {
        reason: String,
    },

    // -- either direction ------------------------------------------------
    /// Application-level traffic; opaque to the engine.
    PlayData {
        data: Bytes,
    },
    /// A packet id the canonical vocabulary does not know. Passed through
    /// untouched for forward compatibility.
    Opaque {
        id: u32,
        payload: Bytes,
    },
}

/// Discriminant of a canonical packet, used by the state machine's
/// legality tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Hello,
    LoginStart,
    EncryptionResponse,
    ClientSettings,
    ConfigurationAck,
    KeepAliveReply,
    Goodbye,
    EncryptionRequest,
    SetCompression,
    LoginSuccess,
    ConfigurationData,
    FinishConfiguration,
    KeepAlive,
    Disconnect,
    Play,
    Opaque,
}

impl CanonicalPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            CanonicalPacket::Hello { .. } => PacketKind::Hello,
            CanonicalPacket::LoginStart { .. } => PacketKind::LoginStart,
            CanonicalPacket::EncryptionResponse { .. } => PacketKind::EncryptionResponse,
            CanonicalPacket::ClientSettings { .. } => PacketKind::ClientSettings,
            CanonicalPacket::ConfigurationAck => PacketKind::ConfigurationAck,
            CanonicalPacket::KeepAliveReply { .. } => PacketKind::KeepAliveReply,
            CanonicalPacket::Goodbye => PacketKind::Goodbye,
            CanonicalPacket::EncryptionRequest { .. } => PacketKind::EncryptionRequest,
            CanonicalPacket::SetCompression { .. } => PacketKind::SetCompression,
            CanonicalPacket::LoginSuccess { .. } => PacketKind::LoginSuccess,
            CanonicalPacket::ConfigurationData { .. } => PacketKind::ConfigurationData,
            CanonicalPacket::FinishConfiguration => PacketKind::FinishConfiguration,
            CanonicalPacket::KeepAlive { .. } => PacketKind::KeepAlive,
            CanonicalPacket::Disconnect { .. } => PacketKind::Disconnect,
            CanonicalPacket::PlayData { .. } => PacketKind::Play,
            CanonicalPacket::Opaque { .. } => PacketKind::Opaque,
        }
    }

    /// Encode at the canonical version.
    pub fn encode(&self) -> PacketFrame {
        let mut buf = BytesMut::new();
        let id = match self {
            CanonicalPacket::Hello {
                protocol_version,
                host,
                port,
            } => {
                write_varint(&mut buf, protocol_version.0);
                write_string(&mut buf, host);
                buf.put_u16(*port);
                serverbound::HELLO
            }
            CanonicalPacket::LoginStart {
                username,
                account_id,
            } => {
                write_string(&mut buf, username);
                buf.put_u128(account_id.as_u128());
                serverbound::LOGIN_START
            }
            CanonicalPacket::EncryptionResponse { client_public } => {
                buf.put_slice(client_public);
                serverbound::ENCRYPTION_RESPONSE
            }
            CanonicalPacket::ClientSettings {
                locale,
                view_distance,
            } => {
                write_string(&mut buf, locale);
                buf.put_u8(*view_distance);
                serverbound::CLIENT_SETTINGS
            }
            CanonicalPacket::ConfigurationAck => serverbound::CONFIGURATION_ACK,
            CanonicalPacket::KeepAliveReply { id } => {
                buf.put_u64(*id);
                serverbound::KEEP_ALIVE_REPLY
            }
            CanonicalPacket::Goodbye => serverbound::GOODBYE,
            CanonicalPacket::EncryptionRequest {
                server_public,
                nonce,
            } => {
                buf.put_slice(server_public);
                buf.put_slice(nonce);
                clientbound::ENCRYPTION_REQUEST
            }
            CanonicalPacket::SetCompression { threshold } => {
                write_varint(&mut buf, *threshold);
                clientbound::SET_COMPRESSION
            }
            CanonicalPacket::LoginSuccess {
                account_id,
                username,
            } => {
                buf.put_u128(account_id.as_u128());
                write_string(&mut buf, username);
                clientbound::LOGIN_SUCCESS
            }
            CanonicalPacket::ConfigurationData { key, value } => {
                write_string(&mut buf, key);
                write_string(&mut buf, value);
                clientbound::CONFIGURATION_DATA
            }
            CanonicalPacket::FinishConfiguration => clientbound::FINISH_CONFIGURATION,
            CanonicalPacket::KeepAlive { id } => {
                buf.put_u64(*id);
                clientbound::KEEP_ALIVE
            }
            CanonicalPacket::Disconnect { reason } => {
                write_string(&mut buf, reason);
                clientbound::DISCONNECT
            }
            CanonicalPacket::PlayData { data } => {
                buf.put_slice(data);
                // Same id both directions at the canonical version.
                serverbound::PLAY_DATA
            }
            CanonicalPacket::Opaque { id, payload } => {
                return PacketFrame::new(*id, payload.clone());
            }
        };
        PacketFrame::new(id, buf.freeze())
    }

    /// Decode a frame already translated to the canonical version.
    ///
    /// # Errors
    /// `CodecError::MalformedField` when a known id carries a payload that
    /// does not parse. Unknown ids succeed as [`CanonicalPacket::Opaque`].
    pub fn decode(direction: Direction, frame: &PacketFrame) -> Result<Self, CodecError> {
        let mut buf = frame.payload.clone();
        let packet = match (direction, frame.id) {
            (Direction::Serverbound, serverbound::HELLO) => CanonicalPacket::Hello {
                protocol_version: ProtocolVersion(read_varint(&mut buf)?),
                host: read_string(&mut buf)?,
                port: read_u16(&mut buf)?,
            },
            (Direction::Serverbound, serverbound::LOGIN_START) => CanonicalPacket::LoginStart {
                username: read_string(&mut buf)?,
                account_id: Uuid::from_u128(read_u128(&mut buf)?),
            },
            (Direction::Serverbound, serverbound::ENCRYPTION_RESPONSE) => {
                CanonicalPacket::EncryptionResponse {
                    client_public: read_array(&mut buf)?,
                }
            }
            (Direction::Serverbound, serverbound::CLIENT_SETTINGS) => {
                CanonicalPacket::ClientSettings {
                    locale: read_string(&mut buf)?,
                    view_distance: read_u8(&mut buf)?,
                }
            }
            (Direction::Serverbound, serverbound::CONFIGURATION_ACK) => {
                CanonicalPacket::ConfigurationAck
            }
            (Direction::Serverbound, serverbound::KEEP_ALIVE_REPLY) => {
                CanonicalPacket::KeepAliveReply {
                    id: read_u64(&mut buf)?,
                }
            }
            (Direction::Serverbound, serverbound::GOODBYE) => CanonicalPacket::Goodbye,
            (Direction::Serverbound, serverbound::PLAY_DATA)
            | (Direction::Clientbound, clientbound::PLAY_DATA) => CanonicalPacket::PlayData {
                data: buf.copy_to_bytes(buf.remaining()),
            },
            (Direction::Clientbound, clientbound::ENCRYPTION_REQUEST) => {
                CanonicalPacket::EncryptionRequest {
                    server_public: read_array(&mut buf)?,
                    nonce: read_array(&mut buf)?,
                }
            }
            (Direction::Clientbound, clientbound::SET_COMPRESSION) => {
                CanonicalPacket::SetCompression {
                    threshold: read_varint(&mut buf)?,
                }
            }
            (Direction::Clientbound, clientbound::LOGIN_SUCCESS) => CanonicalPacket::LoginSuccess {
                account_id: Uuid::from_u128(read_u128(&mut buf)?),
                username: read_string(&mut buf)?,
            },
            (Direction::Clientbound, clientbound::CONFIGURATION_DATA) => {
                CanonicalPacket::ConfigurationData {
                    key: read_string(&mut buf)?,
                    value: read_string(&mut buf)?,
                }
            }
            (Direction::Clientbound, clientbound::FINISH_CONFIGURATION) => {
                CanonicalPacket::FinishConfiguration
            }
            (Direction::Clientbound, clientbound::KEEP_ALIVE) => CanonicalPacket::KeepAlive {
                id: read_u64(&mut buf)?,
            },
            (Direction::Clientbound, clientbound::DISCONNECT) => CanonicalPacket::Disconnect {
                reason: read_string(&mut buf)?,
            },
            _ => CanonicalPacket::Opaque {
                id: frame.id,
                payload: frame.payload.clone(),
            },
        };
        Ok(packet)
    }
}

// -- field primitives ---------------------------------------------------

fn write_string<B: BufMut>(buf: &mut B, s: &str) {
    write_varint(buf, s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn read_string<B: Buf>(buf: &mut B) -> Result<String, CodecError> {
    let len = read_varint(buf)? as usize;
    if len > MAX_STRING_LEN || buf.remaining() < len {
        return Err(CodecError::MalformedField);
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::MalformedField)
}

fn read_u8<B: Buf>(buf: &mut B) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::MalformedField);
    }
    Ok(buf.get_u8())
}

fn read_u16<B: Buf>(buf: &mut B) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::MalformedField);
    }
    Ok(buf.get_u16())
}

fn read_u64<B: Buf>(buf: &mut B) -> Result<u64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::MalformedField);
    }
    Ok(buf.get_u64())
}

fn read_u128<B: Buf>(buf: &mut B) -> Result<u128, CodecError> {
    if buf.remaining() < 16 {
        return Err(CodecError::MalformedField);
    }
    Ok(buf.get_u128())
}

fn read_array<const N: usize, B: Buf>(buf: &mut B) -> Result<[u8; N], CodecError> {
    if buf.remaining() < N {
        return Err(CodecError::MalformedField);
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}
