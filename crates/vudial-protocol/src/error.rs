use thiserror::Error;

/// An out-of-range argument handed to a command builder. Raised before any
/// bytes are produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid parameter `{name}`: {reason}")]
pub struct InvalidParameter {
    pub name: &'static str,
    pub reason: String,
}

impl InvalidParameter {
    pub(crate) fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }
}

/// A byte buffer that could not be decoded as a hub frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: need {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unrecognized opcode 0x{0:02X}")]
    UnrecognizedOpcode(u8),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}
