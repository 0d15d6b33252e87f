//! ASCII hex framing shared by commands and replies.
//!
//! Frame layout:
//! - MARKER (1 byte): `>` host to hub, `<` hub to host
//! - OPCODE (2 hex digits)
//! - DATA TYPE (2 hex digits)
//! - LENGTH (4 hex digits): payload length in bytes
//! - PAYLOAD (2 hex digits per payload byte)
//! - TERMINATOR: `\r\n` on encode, optional on decode

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

pub const COMMAND_MARKER: u8 = b'>';
pub const RESPONSE_MARKER: u8 = b'<';
/// Marker, opcode, data type and length: the smallest decodable frame.
pub const HEADER_LEN: usize = 9;
pub const TERMINATOR: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    None = 0x01,
    Single = 0x02,
    Multiple = 0x03,
    KeyValue = 0x04,
    Status = 0x05,
}

impl DataType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::None,
            0x02 => Self::Single,
            0x03 => Self::Multiple,
            0x04 => Self::KeyValue,
            0x05 => Self::Status,
            _ => return None,
        })
    }
}

/// A frame with its header fields split out but not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub marker: u8,
    pub opcode: u8,
    pub data_type: u8,
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Encode into wire bytes, terminator included.
    ///
    /// Payloads longer than `u16::MAX` cannot be described by the length
    /// field; builders bound their payloads well below that.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() * 2 + TERMINATOR.len());
        out.push(self.marker);
        let header = format!(
            "{:02X}{:02X}{:04X}",
            self.opcode,
            self.data_type,
            self.payload.len() as u16
        );
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(hex::encode_upper(&self.payload).as_bytes());
        out.extend_from_slice(TERMINATOR);
        out
    }

    /// Decode a frame that must open with `marker`.
    ///
    /// A wrong leading byte is reported as [`DecodeError::UnrecognizedOpcode`]
    /// carrying that byte, since the marker is the reply type.
    pub fn parse(bytes: &[u8], marker: u8) -> Result<Self, DecodeError> {
        let bytes = trim_terminator(bytes);
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::TooShort {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != marker {
            return Err(DecodeError::UnrecognizedOpcode(bytes[0]));
        }

        let mut header = [0u8; 4];
        hex::decode_to_slice(&bytes[1..HEADER_LEN], &mut header)
            .map_err(|_| DecodeError::Malformed("header is not hex"))?;
        let len = u16::from_be_bytes([header[2], header[3]]) as usize;

        let body = &bytes[HEADER_LEN..];
        if body.len() < len * 2 {
            return Err(DecodeError::TooShort {
                expected: HEADER_LEN + len * 2,
                actual: bytes.len(),
            });
        }
        if body.len() > len * 2 {
            return Err(DecodeError::Malformed("trailing bytes after payload"));
        }
        let payload = hex::decode(body).map_err(|_| DecodeError::Malformed("payload is not hex"))?;

        Ok(Self {
            marker,
            opcode: header[0],
            data_type: header[1],
            payload,
        })
    }
}

fn trim_terminator(mut bytes: &[u8]) -> &[u8] {
    while let Some((&last, rest)) = bytes.split_last() {
        if last == b'\r' || last == b'\n' {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
