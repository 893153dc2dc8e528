//! # Frame Encoder
//!
//! Encodes camera payloads into length-prefixed frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::*;
use crate::error::Result;

/// Encode a payload into a complete frame
///
/// # Arguments
///
/// * `payload` - Raw payload bytes (JPEG content is not inspected)
///
/// # Returns
///
/// * `Result<Bytes>` - Length prefix followed by the payload
///
/// # Errors
///
/// Returns error if the payload is empty or longer than `u32::MAX` bytes
///
/// # Examples
///
/// ```
/// use drone_telemetry::protocol::encoder::encode_frame;
///
/// let frame = encode_frame(b"abcd").unwrap();
/// assert_eq!(&frame[..], &[4, 0, 0, 0, b'a', b'b', b'c', b'd']);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let prefix = encode_length_prefix(payload)?;

    let mut buf = BytesMut::with_capacity(FRAME_LENGTH_PREFIX_SIZE + payload.len());
    buf.put_slice(&prefix);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Encode the length prefix for a payload
///
/// Kept separate so the stream server can flush the prefix before the payload.
///
/// # Errors
///
/// Returns error if the payload is empty or longer than `u32::MAX` bytes
pub fn encode_length_prefix(payload: &[u8]) -> Result<[u8; FRAME_LENGTH_PREFIX_SIZE]> {
    validate_payload(payload)?;
    Ok((payload.len() as u32).to_le_bytes())
}

/// Encode the zero-length end-of-stream frame
pub fn encode_terminator() -> [u8; FRAME_LENGTH_PREFIX_SIZE] {
    TERMINATOR_LENGTH.to_le_bytes()
}
