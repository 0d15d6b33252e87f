//! Decoding of hub replies.

use crate::address::DialAddress;
use crate::command::Opcode;
use crate::error::DecodeError;
use crate::frame::{DataType, RawFrame, RESPONSE_MARKER};

/// A decoded hub reply: the echoed opcode, its data type and the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    opcode: Opcode,
    data_type: DataType,
    payload: Vec<u8>,
}

impl Response {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let frame = RawFrame::parse(bytes, RESPONSE_MARKER)?;
        let opcode =
            Opcode::from_byte(frame.opcode).ok_or(DecodeError::UnrecognizedOpcode(frame.opcode))?;
        let data_type = DataType::from_byte(frame.data_type)
            .ok_or(DecodeError::Malformed("unknown data type"))?;
        Ok(Self {
            opcode,
            data_type,
            payload: frame.payload,
        })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload as uppercase hex, the same case the hub uses on the wire.
    pub fn payload_hex(&self) -> String {
        hex::encode_upper(&self.payload)
    }

    /// Identifier carried by a UID reply.
    ///
    /// An empty or all-zero payload is how the hub says nothing answers at
    /// that bus position, so it yields `None` rather than an identifier.
    pub fn uid(&self) -> Option<String> {
        if self.payload.iter().all(|&b| b == 0) {
            return None;
        }
        Some(self.payload_hex())
    }

    /// Status code of a status reply; zero means success.
    pub fn status(&self) -> Option<u8> {
        if self.data_type != DataType::Status {
            return None;
        }
        self.payload.first().copied()
    }

    /// Bus positions flagged online in a devices-map reply, lowest bit first.
    pub fn devices_map(&self) -> Vec<DialAddress> {
        let mask = self.payload.first().copied().unwrap_or(0);
        DialAddress::all()
            .filter(|dial| mask & (1 << dial.get()) != 0)
            .collect()
    }

    /// Payload read as text, trailing NULs dropped.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .trim_end_matches('\0')
            .to_string()
    }
}
