//! Protocol Messages
//!
//! Inbound commands are JSON `{ "type": ..., "data": { ... } }` objects.
//! Outbound frames are binary:
//!
//! ```text
//! [u32 LE kind length][kind bytes][payload]
//! ```
//!
//! where the payload of a record-bearing frame is a run of object records
//! (`[u32 LE id][u8 type]` plus `[f32 LE x][f32 LE y]` for positioned kinds),
//! and the payload of a `player_left` frame is a single `u32 LE` id.

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Direction, Point};
use crate::game::object::{ObjectId, ObjectType, OBJECT_HEADER_SIZE};

/// Bytes taken by the kind-length prefix.
pub const KIND_LEN_SIZE: usize = 4;

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Steady-state delta frame.
pub const MSG_POSITION_UPDATE: &str = "position_update";

/// Full encoding of a newly joined player, sent to everyone.
pub const MSG_PLAYER_JOINED: &str = "player_joined";

/// Id of a departed player, sent to everyone.
pub const MSG_PLAYER_LEFT: &str = "player_left";

/// Full encoding of every object, sent to a joining observer.
pub const MSG_SNAPSHOT: &str = "snapshot";

/// Inbound movement command.
pub const CMD_INPUT_MOVEMENT: &str = "input_movement";

/// Inbound chat command.
pub const CMD_CHAT_MESSAGE: &str = "chat_message";

// =============================================================================
// ERRORS
// =============================================================================

/// Protocol errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame ended before a complete field.
    #[error("Truncated frame: needed {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        /// Offset of the field being read
        offset: usize,
        /// Bytes the field needs
        needed: usize,
        /// Bytes left in the frame
        available: usize,
    },

    /// Message kind is not UTF-8.
    #[error("Message kind is not valid UTF-8")]
    InvalidKind,

    /// Record carries a type tag this server never writes.
    #[error("Unknown object type tag {0}")]
    UnknownObjectType(u8),

    /// Command payload lacks a required field.
    #[error("Missing field '{0}' in command data")]
    MissingField(&'static str),

    /// Movement command names no known direction.
    #[error("Unknown direction '{0}'")]
    UnknownDirection(String),
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Inbound command as received from a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Command kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Loosely typed payload.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// A command the session knows how to route.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Steer the sender's player.
    Move(Direction),
    /// Chat text (not relayed).
    Chat(String),
    /// Any other kind.
    Unknown(String),
}

impl ClientEvent {
    /// Create a command with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: serde_json::Map::new(),
        }
    }

    /// Movement command for a direction.
    pub fn movement(direction: Direction) -> Self {
        let mut event = Self::new(CMD_INPUT_MOVEMENT);
        event
            .data
            .insert("direction".into(), serde_json::Value::String(direction.token().into()));
        event
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Resolve into a routable command.
    pub fn command(&self) -> Result<ClientCommand, ProtocolError> {
        match self.kind.as_str() {
            CMD_INPUT_MOVEMENT => {
                let token = self
                    .data
                    .get("direction")
                    .and_then(serde_json::Value::as_str)
                    .ok_or(ProtocolError::MissingField("direction"))?;
                token
                    .parse()
                    .map(ClientCommand::Move)
                    .map_err(|_| ProtocolError::UnknownDirection(token.to_string()))
            }
            CMD_CHAT_MESSAGE => {
                let text = self
                    .data
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                Ok(ClientCommand::Chat(text.to_string()))
            }
            other => Ok(ClientCommand::Unknown(other.to_string())),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT FRAMES
// =============================================================================

/// Length of the header for a message kind.
#[inline]
pub fn frame_header_size(kind: &str) -> usize {
    KIND_LEN_SIZE + kind.len()
}

/// Write `[len][kind]` at the start of `buf`. Returns bytes written.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`frame_header_size`].
pub fn write_frame_header(buf: &mut [u8], kind: &str) -> usize {
    let len = kind.len();
    buf[..KIND_LEN_SIZE].copy_from_slice(&(len as u32).to_le_bytes());
    buf[KIND_LEN_SIZE..KIND_LEN_SIZE + len].copy_from_slice(kind.as_bytes());
    KIND_LEN_SIZE + len
}

/// Build a `player_left` frame.
pub fn encode_player_left(id: ObjectId) -> Vec<u8> {
    let mut buf = vec![0u8; frame_header_size(MSG_PLAYER_LEFT) + 4];
    let offset = write_frame_header(&mut buf, MSG_PLAYER_LEFT);
    buf[offset..].copy_from_slice(&id.to_le_bytes());
    buf
}

/// One object record read back from a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedRecord {
    /// Object id
    pub id: ObjectId,
    /// Object kind
    pub object_type: ObjectType,
    /// Position, for positioned kinds
    pub position: Option<Point>,
}

/// A record-bearing frame read back from bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Message kind
    pub kind: String,
    /// Records in wire order
    pub records: Vec<DecodedRecord>,
}

fn take<'a>(bytes: &'a [u8], offset: usize, needed: usize) -> Result<&'a [u8], ProtocolError> {
    bytes
        .get(offset..offset + needed)
        .ok_or(ProtocolError::Truncated {
            offset,
            needed,
            available: bytes.len().saturating_sub(offset),
        })
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(take(bytes, offset, 4)?);
    Ok(u32::from_le_bytes(raw))
}

fn read_f32(bytes: &[u8], offset: usize) -> Result<f32, ProtocolError> {
    read_u32(bytes, offset).map(f32::from_bits)
}

/// Split a frame into its kind and payload.
pub fn decode_frame_header(bytes: &[u8]) -> Result<(&str, &[u8]), ProtocolError> {
    let len = read_u32(bytes, 0)? as usize;
    let kind = take(bytes, KIND_LEN_SIZE, len)?;
    let kind = std::str::from_utf8(kind).map_err(|_| ProtocolError::InvalidKind)?;
    Ok((kind, &bytes[KIND_LEN_SIZE + len..]))
}

/// Read a run of object records. Each record's length follows from its tag.
pub fn decode_records(payload: &[u8]) -> Result<Vec<DecodedRecord>, ProtocolError> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        let id = read_u32(payload, offset)?;
        let tag = take(payload, offset + 4, 1)?[0];
        let object_type = ObjectType::from_u8(tag).ok_or(ProtocolError::UnknownObjectType(tag))?;
        offset += OBJECT_HEADER_SIZE;

        let position = if object_type.has_position() {
            let x = read_f32(payload, offset)?;
            let y = read_f32(payload, offset + 4)?;
            offset += 8;
            Some(Point::new(x, y))
        } else {
            None
        };

        records.push(DecodedRecord {
            id,
            object_type,
            position,
        });
    }

    Ok(records)
}

/// Decode a record-bearing frame (`position_update`, `player_joined`,
/// `snapshot`).
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, ProtocolError> {
    let (kind, payload) = decode_frame_header(bytes)?;
    Ok(DecodedFrame {
        kind: kind.to_string(),
        records: decode_records(payload)?,
    })
}

/// Decode a `player_left` frame into the departed id.
pub fn decode_player_left(bytes: &[u8]) -> Result<ObjectId, ProtocolError> {
    let (kind, payload) = decode_frame_header(bytes)?;
    if kind != MSG_PLAYER_LEFT {
        return Err(ProtocolError::InvalidKind);
    }
    read_u32(payload, 0)
}
