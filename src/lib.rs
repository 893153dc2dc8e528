//! # Drone Telemetry Library
//!
//! Onboard sensor sampling for a small drone.
//!
//! This library provides:
//! - Sample sources for an MPU6050 accelerometer, an ultrasonic proximity
//!   sensor and a camera, plus simulators for each
//! - A fixed-cadence sample loop with cancellation
//! - JSON telemetry records for stdout
//! - A single-client TCP stream of length-prefixed camera frames

pub mod config;
pub mod error;
pub mod hal;
pub mod protocol;
pub mod sampler;
pub mod sensor;
pub mod session;
pub mod sink;
pub mod stream;
