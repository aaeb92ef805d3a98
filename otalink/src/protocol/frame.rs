//! OTA wire protocol frames.
//!
//! The sender drives the session with three frame types; the receiver
//! answers every frame with a single status byte.
//!
//! ## Frame Format
//!
//! All multi-byte integers are big-endian:
//!
//! ```text
//! START_OTA   +------+---------------+
//!             | 0x01 | size: u32     |          5 bytes
//!             +------+---------------+
//! DATA_CHUNK  +------+----------+--------------+
//!             | 0x02 | len: u16 | payload[len] |  3 + len bytes
//!             +------+----------+--------------+
//! END_OTA     +------+
//!             | 0x03 |                          1 byte
//!             +------+
//! ```
//!
//! The receiver replies `0xAA` (ACK) or `0xFF` (NAK) after each frame.

use std::fmt;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Opcode announcing a new transfer and its total size.
pub const OP_START_OTA: u8 = 0x01;

/// Opcode carrying one slice of the firmware image.
pub const OP_DATA_CHUNK: u8 = 0x02;

/// Opcode closing the transfer.
pub const OP_END_OTA: u8 = 0x03;

/// Reply byte for "frame accepted, proceed".
pub const REPLY_ACK: u8 = 0xAA;

/// Reply byte for "frame rejected, send again".
pub const REPLY_NAK: u8 = 0xFF;

/// Largest payload one `DATA_CHUNK` may carry.
///
/// The receiver assembles each frame in a fixed 1024-byte buffer:
/// 1 opcode byte + 2 length bytes + up to 1021 payload bytes.
pub const MAX_CHUNK_PAYLOAD: usize = 1021;

/// Header bytes preceding a `DATA_CHUNK` payload (opcode + length).
pub const DATA_HEADER_LEN: usize = 3;

/// One sender-to-receiver protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opens a session, declaring the total image size in bytes.
    StartOta {
        /// Total firmware size the session will deliver.
        total_size: u32,
    },
    /// Carries one bounded slice of the image.
    ///
    /// Invariant: `1 <= payload.len() <= MAX_CHUNK_PAYLOAD`, enforced by
    /// [`encode`].
    DataChunk {
        /// Raw image bytes for this chunk.
        payload: Vec<u8>,
    },
    /// Closes the session.
    EndOta,
}

impl Frame {
    /// Opcode byte identifying this frame on the wire.
    pub fn opcode(&self) -> u8 {
        match self {
            Frame::StartOta { .. } => OP_START_OTA,
            Frame::DataChunk { .. } => OP_DATA_CHUNK,
            Frame::EndOta => OP_END_OTA,
        }
    }

    /// Encoded size of this frame in bytes.
    pub fn wire_len(&self) -> usize {
        match self {
            Frame::StartOta { .. } => 5,
            Frame::DataChunk { payload } => DATA_HEADER_LEN + payload.len(),
            Frame::EndOta => 1,
        }
    }
}

/// Encode a frame into its wire bytes.
///
/// Fails only with [`Error::InvalidChunkSize`] when a `DataChunk` payload
/// violates the `1..=MAX_CHUNK_PAYLOAD` bound; in-invariant frames always
/// encode.
#[allow(clippy::cast_possible_truncation)] // len <= 1021 checked above the cast
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(frame.wire_len());
    match frame {
        Frame::StartOta { total_size } => {
            buf.push(OP_START_OTA);
            buf.write_u32::<BigEndian>(*total_size).unwrap();
        }
        Frame::DataChunk { payload } => {
            let len = payload.len();
            if len == 0 || len > MAX_CHUNK_PAYLOAD {
                return Err(Error::InvalidChunkSize { len });
            }
            buf.push(OP_DATA_CHUNK);
            buf.write_u16::<BigEndian>(len as u16).unwrap();
            buf.extend_from_slice(payload);
        }
        Frame::EndOta => buf.push(OP_END_OTA),
    }
    Ok(buf)
}

/// Decode one complete frame from wire bytes.
///
/// The input must hold exactly one frame; short input, unknown opcodes,
/// out-of-bound chunk lengths, and trailing bytes are all rejected.
pub fn decode(data: &[u8]) -> Result<Frame> {
    let (&opcode, rest) = data
        .split_first()
        .ok_or_else(|| Error::Frame("empty input".into()))?;

    match opcode {
        OP_START_OTA => {
            if rest.len() != 4 {
                return Err(Error::Frame(format!(
                    "START_OTA expects 4 size bytes, got {}",
                    rest.len()
                )));
            }
            let total_size = (&rest[..]).read_u32::<BigEndian>()?;
            Ok(Frame::StartOta { total_size })
        }
        OP_DATA_CHUNK => {
            if rest.len() < 2 {
                return Err(Error::Frame("DATA_CHUNK header truncated".into()));
            }
            let len = usize::from((&rest[..2]).read_u16::<BigEndian>()?);
            if len == 0 || len > MAX_CHUNK_PAYLOAD {
                return Err(Error::Frame(format!("chunk length {len} out of range")));
            }
            let body = &rest[2..];
            if body.len() != len {
                return Err(Error::Frame(format!(
                    "DATA_CHUNK declares {len} payload bytes, got {}",
                    body.len()
                )));
            }
            Ok(Frame::DataChunk {
                payload: body.to_vec(),
            })
        }
        OP_END_OTA => {
            if !rest.is_empty() {
                return Err(Error::Frame(format!(
                    "END_OTA carries no payload, got {} trailing bytes",
                    rest.len()
                )));
            }
            Ok(Frame::EndOta)
        }
        other => Err(Error::Frame(format!("unknown opcode {other:#04x}"))),
    }
}

/// Receiver verdict on the most recent frame.
///
/// `Unexpected` and `Timeout` are distinguished from `Nak` for logging
/// only; the engine treats all three as "not acknowledged".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Frame accepted, proceed.
    Ack,
    /// Frame rejected, send again.
    Nak,
    /// A byte arrived that is neither ACK nor NAK.
    Unexpected(u8),
    /// No byte arrived within the reply timeout.
    Timeout,
}

impl Reply {
    /// `true` only for [`Reply::Ack`].
    pub fn is_ack(self) -> bool {
        self == Reply::Ack
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack => f.write_str("ACK"),
            Reply::Nak => f.write_str("NAK"),
            Reply::Unexpected(byte) => write!(f, "unexpected byte {byte:#04x}"),
            Reply::Timeout => f.write_str("no reply before timeout"),
        }
    }
}

/// Map a received byte, or its absence, to a [`Reply`].
pub fn decode_reply(byte: Option<u8>) -> Reply {
    match byte {
        Some(REPLY_ACK) => Reply::Ack,
        Some(REPLY_NAK) => Reply::Nak,
        Some(other) => Reply::Unexpected(other),
        None => Reply::Timeout,
    }
}
