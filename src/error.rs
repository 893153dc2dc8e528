//! # Error Types
//!
//! Custom error types for Drone Telemetry using `thiserror`.

use thiserror::Error;

/// Main error type for Drone Telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Frame encoding/decoding errors
    #[error("Frame protocol error: {0}")]
    Frame(String),

    /// Stream server errors (bind, accept, write to client)
    #[error("Stream error: {0}")]
    Stream(String),

    /// Sensor bus, GPIO or camera errors
    #[error("Device error: {0}")]
    Device(String),

    /// A reading was handed to a sink that cannot encode it
    #[error("Unsupported reading for this sink: {0}")]
    UnsupportedReading(&'static str),

    /// A blocking sampling task failed to complete
    #[error("Sampling task failed: {0}")]
    Task(String),

    /// The session was cancelled before the operation could complete
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Drone Telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;
