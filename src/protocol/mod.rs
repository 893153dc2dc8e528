//! # Telemetry Protocol Module
//!
//! Wire formats used to deliver sensor readings.
//!
//! This module handles:
//! - Length-prefixed binary frames (4-byte little-endian length + payload)
//! - The zero-length terminator frame that ends a stream gracefully
//! - Incremental frame decoding for clients
//! - JSON telemetry records for the stdout path

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod record;
