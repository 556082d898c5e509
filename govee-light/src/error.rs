//! Light engine error types

use std::time::Duration;

use govee_transport::{FrameError, TransportError};
use thiserror::Error;

/// Errors from light operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightError {
    /// Frame payload over 17 bytes (caller error)
    #[error("Payload too long: {len} bytes")]
    PayloadTooLong { len: usize },

    /// Brightness or color component outside 0-255
    #[error("{field} out of range: {value} (expected 0-255)")]
    ValueOutOfRange { field: &'static str, value: u16 },

    /// Inbound frame failed checksum verification
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Inbound frame of the wrong size
    #[error("Malformed frame: {len} bytes")]
    MalformedFrame { len: usize },

    /// Previous connection failures put the device in a backoff window
    #[error("Connection backoff active after {failures} failures ({remaining:?} remaining)")]
    ConnectionBackoffActive { failures: u32, remaining: Duration },

    /// Every connect attempt failed
    #[error("Connection failed after {attempts} attempts{}", last_error_suffix(.last_error))]
    ConnectionAttemptsExhausted {
        attempts: u32,
        last_error: Option<TransportError>,
    },

    /// At least one frame of a flush could not be written
    #[error("Transmit failed for {failed} of {total} frames: {source}")]
    TransmitFailed {
        failed: usize,
        total: usize,
        source: TransportError,
    },

    /// Effect name not in the effect table
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    /// Feature not supported by this device
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// The query behind a pending response was never delivered
    #[error("Response abandoned")]
    ResponseAbandoned,

    /// Link layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

fn last_error_suffix(last_error: &Option<TransportError>) -> String {
    match last_error {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}

impl From<FrameError> for LightError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::PayloadTooLong { len } => LightError::PayloadTooLong { len },
            FrameError::InvalidLength { len } => LightError::MalformedFrame { len },
            FrameError::ChecksumMismatch { expected, actual } => {
                LightError::ChecksumMismatch { expected, actual }
            }
        }
    }
}
