//! Full-frame image upload: clear, reset the cursor, write chunks, show.
//!
//! The hub needs time to digest each display command, so every step carries
//! a settle delay that is honoured before the next one is sent.

use crate::epaper::{ImageError, PackedFrame};
use crate::transport::{Transport, TransportError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vudial_protocol::display_constants::BYTES_PER_COLUMN;
use vudial_protocol::{Command, DialAddress, InvalidParameter};

/// Whole columns sent per `DisplayImageData` command.
pub const COLUMNS_PER_CHUNK: usize = 50;
/// 18 bytes per column * 50 columns.
pub const CHUNK_LEN: usize = BYTES_PER_COLUMN * COLUMNS_PER_CHUNK;
/// Wait after the clear and cursor commands.
pub const COMMAND_SETTLE: Duration = Duration::from_millis(100);
/// Wait after each image chunk.
pub const CHUNK_SETTLE: Duration = Duration::from_millis(250);

/// Where an upload stands once a step has been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Cleared,
    CursorReset,
    Writing { chunk: usize },
    Shown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadStep {
    pub state: UploadState,
    pub command: Command,
    pub settle: Duration,
}

/// The ordered command sequence for one frame.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    dial: DialAddress,
    steps: Vec<UploadStep>,
    chunks: usize,
    bytes: usize,
}

impl UploadPlan {
    pub fn new(dial: DialAddress, frame: &PackedFrame) -> Result<Self, InvalidParameter> {
        Self::from_bytes(dial, frame.as_bytes())
    }

    fn from_bytes(dial: DialAddress, bytes: &[u8]) -> Result<Self, InvalidParameter> {
        let mut steps = vec![
            UploadStep {
                state: UploadState::Cleared,
                command: Command::display_clear(dial, false),
                settle: COMMAND_SETTLE,
            },
            UploadStep {
                state: UploadState::CursorReset,
                command: Command::display_goto_xy(dial, 0, 0)?,
                settle: COMMAND_SETTLE,
            },
        ];
        let mut chunks = 0;
        for (chunk, data) in chunks_of(bytes, CHUNK_LEN).enumerate() {
            steps.push(UploadStep {
                state: UploadState::Writing { chunk },
                command: Command::display_image_data(dial, data)?,
                settle: CHUNK_SETTLE,
            });
            chunks += 1;
        }
        steps.push(UploadStep {
            state: UploadState::Shown,
            command: Command::display_show_image(dial),
            settle: Duration::ZERO,
        });
        Ok(Self {
            dial,
            steps,
            chunks,
            bytes: bytes.len(),
        })
    }

    pub fn dial(&self) -> DialAddress {
        self.dial
    }

    pub fn steps(&self) -> &[UploadStep] {
        &self.steps
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}

/// Split `bytes` into runs of `chunk_len`; the last one holds the remainder.
pub fn chunks_of(bytes: &[u8], chunk_len: usize) -> impl Iterator<Item = &[u8]> {
    bytes.chunks(chunk_len.max(1))
}

/// Waits out settle delays between upload steps.
pub trait Pacer {
    fn settle(&mut self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn settle(&mut self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Cooperative stop flag, checked between upload steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing was sent; the display still shows its previous image.
    #[error("image conversion failed: {0}")]
    Conversion(#[from] ImageError),
    #[error("could not encode upload: {0}")]
    Encode(#[from] InvalidParameter),
    /// The display is in an unknown state until the next full upload.
    #[error("transmission failed after reaching {reached:?}: {source}")]
    Transmission {
        reached: UploadState,
        #[source]
        source: TransportError,
    },
    #[error("upload cancelled after {completed_steps} steps")]
    Cancelled { completed_steps: usize },
}

impl UploadError {
    /// Whether the failure happened before any command reached the hub.
    pub fn before_transmission(&self) -> bool {
        match self {
            UploadError::Conversion(_) | UploadError::Encode(_) => true,
            UploadError::Transmission { reached, .. } => *reached == UploadState::Idle,
            UploadError::Cancelled { completed_steps } => *completed_steps == 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub chunks: usize,
    pub bytes: usize,
}

/// Run `plan` to completion. Failures are not retried: the first one ends
/// the upload.
pub fn run<T, P>(
    transport: &mut T,
    pacer: &mut P,
    plan: &UploadPlan,
    cancel: &CancelToken,
) -> Result<UploadReport, UploadError>
where
    T: Transport + ?Sized,
    P: Pacer + ?Sized,
{
    info!(
        "uploading {} bytes to dial {} in {} chunks",
        plan.bytes, plan.dial, plan.chunks
    );
    let mut reached = UploadState::Idle;
    for (index, step) in plan.steps.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("upload to dial {} cancelled at {reached:?}", plan.dial);
            return Err(UploadError::Cancelled {
                completed_steps: index,
            });
        }
        if let Err(source) = transport.send(&step.command) {
            warn!("upload to dial {} failed after {reached:?}: {source}", plan.dial);
            return Err(UploadError::Transmission { reached, source });
        }
        reached = step.state;
        debug!("dial {} -> {reached:?}", plan.dial);
        pacer.settle(step.settle);
    }
    Ok(UploadReport {
        chunks: plan.chunks,
        bytes: plan.bytes,
    })
}
