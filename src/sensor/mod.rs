//! # Sensor Module
//!
//! Sample sources for the drone's onboard sensors.
//!
//! This module handles:
//! - MPU6050 accelerometer register decoding over an I2C bus
//! - HC-SR04 style ultrasonic time-of-flight measurement over GPIO
//! - Camera frame capture
//! - Simulated sources for running without hardware

pub mod accelerometer;
pub mod camera;
pub mod proximity;
pub mod simulator;

use crate::error::Result;

/// A single typed sensor reading
///
/// Produced once per sampling cycle and moved into the sink that encodes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Distance to the nearest obstacle in centimetres
    Proximity { distance_cm: f64 },

    /// Acceleration on each axis in g
    Acceleration { x: f64, y: f64, z: f64 },

    /// Raw JPEG bytes as delivered by the camera driver
    ImageFrame(Vec<u8>),
}

impl Reading {
    /// Short name of the reading kind, used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Reading::Proximity { .. } => "proximity",
            Reading::Acceleration { .. } => "accelerometer",
            Reading::ImageFrame(_) => "camera",
        }
    }
}

/// A reading stamped by the sample loop
#[derive(Debug, Clone, PartialEq)]
pub struct StampedReading {
    pub reading: Reading,

    /// Unix epoch milliseconds at the time the reading was taken
    pub timestamp_ms: i64,

    /// Loop index of this reading
    pub index: u64,
}

/// Result of polling a source once
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A reading was produced
    Ready(Reading),

    /// No usable signal this cycle (echo timeout, out of range)
    Skipped,

    /// The source has nothing more to deliver
    Exhausted,
}

/// A physical or simulated sensor polled by the sample loop
///
/// `sample` may block (GPIO busy polling, bus transfers); the loop runs it on the
/// blocking pool.
pub trait SampleSource: Send + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Poll the sensor once
    fn sample(&mut self) -> Result<SampleOutcome>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn sample(&mut self) -> Result<SampleOutcome> {
        (**self).sample()
    }
}
