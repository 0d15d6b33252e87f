//! Core functionalities: serial transport, e-paper pipeline, uploads, client.

pub mod client;
pub mod config;
pub mod epaper;
pub mod logbuf;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod record;
pub mod serial_service;
pub mod transport;
pub mod upload;

pub use client::{ClientError, DialClient};
pub use config::{ClientConfig, ConfigError};
pub use epaper::{Grayscale, ImageError, PackedFrame};
pub use logbuf::{Direction, LogEntry, LogStore};
pub use record::{Backlight, DialRecord};
pub use serial_service::{SerialConfig, SerialEvent, SerialService};
pub use transport::{ConnectionState, Transport, TransportError};
pub use upload::{
    CancelToken, Pacer, ThreadPacer, UploadError, UploadPlan, UploadReport, UploadState,
};
pub use vudial_protocol as protocol;
