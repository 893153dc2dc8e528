//! # Frame Decoder
//!
//! Decodes length-prefixed frames on the receiving side of a camera stream.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::frame::*;
use crate::error::{Result, TelemetryError};

/// Incremental decoder over a growing byte buffer
///
/// Bytes may arrive in arbitrary chunks; a frame is only yielded once its
/// length prefix and the full payload are buffered.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_payload: usize,
    finished: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_DECODER_MAX_PAYLOAD)
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects payloads larger than `max_payload`
    pub fn new(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_payload,
            finished: false,
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Whether the terminator frame has been decoded
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame
    ///
    /// # Returns
    ///
    /// * `Ok(Some(FrameEvent))` - A data frame or the terminator
    /// * `Ok(None)` - More bytes are needed
    ///
    /// # Errors
    ///
    /// Returns error if a declared length exceeds the configured maximum or if
    /// bytes follow the terminator.
    pub fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        if self.finished {
            if self.buffer.is_empty() {
                return Ok(None);
            }
            return Err(TelemetryError::Frame(format!(
                "{} bytes received after terminator frame",
                self.buffer.len()
            )));
        }

        if self.buffer.len() < FRAME_LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = u32::from_le_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if length == TERMINATOR_LENGTH as usize {
            self.buffer.advance(FRAME_LENGTH_PREFIX_SIZE);
            self.finished = true;
            return Ok(Some(FrameEvent::End));
        }

        if length > self.max_payload {
            return Err(TelemetryError::Frame(format!(
                "declared length {} exceeds maximum {}",
                length, self.max_payload
            )));
        }

        if self.buffer.len() < FRAME_LENGTH_PREFIX_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(FRAME_LENGTH_PREFIX_SIZE);
        let payload = self.buffer.split_to(length).freeze();

        Ok(Some(FrameEvent::Data(Frame::new(payload)?)))
    }
}

/// Read exactly one frame from an async reader
///
/// # Returns
///
/// * `Ok(FrameEvent::Data)` - The next data frame
/// * `Ok(FrameEvent::End)` - The terminator was read; the caller must stop reading
///
/// # Errors
///
/// Returns `Stream` error if the peer disconnects mid-frame or before sending a
/// terminator (abrupt end), and `Frame` error for oversized declared lengths.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<FrameEvent>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_LENGTH_PREFIX_SIZE];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| TelemetryError::Stream(format!("stream ended without terminator: {}", e)))?;

    let length = u32::from_le_bytes(prefix) as usize;
    if length == TERMINATOR_LENGTH as usize {
        return Ok(FrameEvent::End);
    }

    if length > max_payload {
        return Err(TelemetryError::Frame(format!(
            "declared length {} exceeds maximum {}",
            length, max_payload
        )));
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| TelemetryError::Stream(format!("truncated frame of {} bytes: {}", length, e)))?;

    Ok(FrameEvent::Data(Frame::new(payload)?))
}
