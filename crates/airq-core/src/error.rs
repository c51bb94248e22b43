//! Error types for airq-core.
//!
//! This module defines the errors that can occur while talking to the sensor
//! through its device abstraction.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Io`] | Retry on the next tick | USB-serial bridges have transient hiccups |
//! | [`Error::Timeout`] | Retry on the next tick | The sensor may be sleeping or slow |
//! | [`Error::Closed`] | Stop | The endpoint returned no data; it is assumed dead |
//! | [`Error::Serial`] | Stop | The port could not be opened |
//! | [`Error::Cancelled`] | Stop | Shutdown was requested |
//! | [`Error::InvalidConfig`] | Stop | Fix configuration and restart |
//!
//! Use [`Error::is_terminal`] to apply this table in code.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when reading from a sensor device.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to open or configure the serial port.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error while reading from the device.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The device returned a successful read of zero bytes.
    #[error("Device {device} returned 0 bytes of data")]
    Closed {
        /// Name of the device that closed.
        device: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a closed-endpoint error for a device.
    pub fn closed(device: impl Into<String>) -> Self {
        Self::Closed {
            device: device.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether a polling loop must stop after this error.
    ///
    /// I/O errors and timeouts are transient and should be retried on the
    /// next scheduled read; everything else ends the loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Timeout { .. })
    }
}

/// Result type alias using airq-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
