//! Wire protocol of the VU Dial hub: command encoding and reply decoding.
//!
//! Everything here is pure; transports live in `vudial-core`.

pub mod address;
pub mod command;
pub mod display_constants;
pub mod error;
pub mod frame;
pub mod response;

pub use address::DialAddress;
pub use command::{percent_to_unit, Command, Opcode};
pub use error::{DecodeError, InvalidParameter};
pub use frame::DataType;
pub use response::Response;
