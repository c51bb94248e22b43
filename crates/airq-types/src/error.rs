//! Error types for frame decoding in airq-types.

use thiserror::Error;

/// Errors that can occur when decoding a sensor frame.
///
/// Every variant describes a frame that must be discarded: none of them is
/// fatal to the caller, and no partially decoded data is ever returned.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Fewer bytes than a full frame were available.
    #[error("Insufficient bytes: frame requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes provided.
        actual: usize,
    },

    /// The frame did not start with the `0xAA 0xC0` header.
    #[error("Invalid header: 0x{:02X} 0x{:02X}", .observed[0], .observed[1])]
    InvalidHeader {
        /// The two bytes found at the head of the buffer.
        observed: [u8; 2],
    },

    /// The payload checksum did not match the checksum byte.
    #[error("Checksum mismatch: computed 0x{computed:02X}, frame carries 0x{expected:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the payload bytes.
        computed: u8,
        /// Checksum transmitted by the sensor.
        expected: u8,
    },
}

/// Result type alias using airq-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
