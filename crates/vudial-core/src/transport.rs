use std::fmt;
use thiserror::Error;
use vudial_protocol::{Command, DecodeError, Response};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(String),
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected(port) => write!(f, "connected to {port}"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport worker stopped")]
    WorkerGone,
    #[error("undecodable reply: {0}")]
    Decode(#[from] DecodeError),
}

/// A byte link to one hub. Single owner: `&mut self` keeps at most one
/// request in flight.
pub trait Transport {
    /// Open the link. Returns whether it is usable afterwards.
    fn connect(&mut self) -> bool;

    fn disconnect(&mut self);

    /// Hand `command` to the link without waiting for the hub's reply.
    fn send(&mut self, command: &Command) -> Result<(), TransportError>;

    /// Send `command` and wait for the reply echoing its opcode.
    /// `Ok(None)` means the transport's reply timeout elapsed first.
    fn request(&mut self, command: &Command) -> Result<Option<Response>, TransportError>;

    fn state(&self) -> ConnectionState;
}
