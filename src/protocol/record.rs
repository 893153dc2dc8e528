//! # Telemetry Records
//!
//! JSON documents written to stdout, one per reading.
//!
//! Records are pretty-printed and end with a newline. Consumers must treat
//! everything written between two flushes as one JSON document rather than
//! splitting on newlines.
//!
//! ```text
//! {
//!   "proximity": 72.0,
//!   "timestamp": 1700000000000,
//!   "index": 0
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};
use crate::sensor::{Reading, StampedReading};

/// Three-axis acceleration in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValues {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Sensor-specific part of a record
///
/// Serialized as a single key (`proximity` or `accelerometer`) merged into the
/// record object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorPayload {
    Proximity(f64),
    Accelerometer(AxisValues),
}

/// One telemetry reading as written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(flatten)]
    pub payload: SensorPayload,
    pub timestamp: i64,
    pub index: u64,
}

/// Timing metadata printed for every image sent over the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub timestamp: i64,
    pub index: u64,
}

impl TelemetryRecord {
    /// Build a record from a stamped reading
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedReading` for image frames, which travel over the
    /// binary stream instead.
    pub fn from_stamped(stamped: &StampedReading) -> Result<Self> {
        let payload = match stamped.reading {
            Reading::Proximity { distance_cm } => SensorPayload::Proximity(distance_cm),
            Reading::Acceleration { x, y, z } => {
                SensorPayload::Accelerometer(AxisValues { x, y, z })
            }
            Reading::ImageFrame(_) => {
                return Err(TelemetryError::UnsupportedReading(stamped.reading.kind()))
            }
        };

        Ok(Self {
            payload,
            timestamp: stamped.timestamp_ms,
            index: stamped.index,
        })
    }
}

impl From<&StampedReading> for FrameMetadata {
    fn from(stamped: &StampedReading) -> Self {
        Self {
            timestamp: stamped.timestamp_ms,
            index: stamped.index,
        }
    }
}

/// Encode a stamped reading as a pretty-printed, newline-terminated document
pub fn encode_record(stamped: &StampedReading) -> Result<Vec<u8>> {
    let record = TelemetryRecord::from_stamped(stamped)?;
    to_document(&record)
}

/// Encode image timing metadata as a pretty-printed, newline-terminated document
pub fn encode_metadata(stamped: &StampedReading) -> Result<Vec<u8>> {
    to_document(&FrameMetadata::from(stamped))
}

fn to_document<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut doc = serde_json::to_vec_pretty(value)?;
    doc.push(b'\n');
    Ok(doc)
}
