//! # Frame Protocol Constants and Types
//!
//! Core definitions for the length-prefixed camera stream.
//!
//! ```text
//! +---------------------+---------------------------+
//! | length (4 bytes LE) | payload (length bytes)    |
//! +---------------------+---------------------------+
//! ```
//!
//! A frame whose length is zero carries no payload and marks the graceful end
//! of the stream.

use bytes::Bytes;

use crate::error::{Result, TelemetryError};

/// Size of the length prefix in bytes
pub const FRAME_LENGTH_PREFIX_SIZE: usize = 4;

/// Declared length of the end-of-stream frame
pub const TERMINATOR_LENGTH: u32 = 0;

/// Largest payload the length prefix can describe
pub const MAX_FRAME_PAYLOAD: usize = u32::MAX as usize;

/// Default upper bound on payloads accepted by a decoder (16 MiB)
///
/// Camera JPEGs at the configured resolutions stay well below this.
pub const DEFAULT_DECODER_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A non-terminal frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes (never empty)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new data frame
    ///
    /// # Errors
    ///
    /// Returns error if the payload is empty (reserved for the terminator) or
    /// does not fit a `u32` length prefix.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        validate_payload(&payload)?;
        Ok(Self { payload })
    }

    /// Declared length of this frame
    ///
    /// Cannot truncate since the payload was validated in `new`.
    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Total bytes on the wire (prefix + payload)
    pub fn wire_size(&self) -> usize {
        FRAME_LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Check that a payload can be sent as a data frame
///
/// # Errors
///
/// Returns error if the payload is empty or does not fit a `u32` length prefix
pub fn validate_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(TelemetryError::Frame(
            "empty payload is reserved for the terminator frame".to_string(),
        ));
    }
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(TelemetryError::Frame(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            MAX_FRAME_PAYLOAD
        )));
    }
    Ok(())
}

/// One decoded unit of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A data frame
    Data(Frame),

    /// The zero-length terminator
    End,
}
