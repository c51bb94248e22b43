//! Frame decoding and reading types for SDS011-class particulate sensors.
//!
//! This crate has no I/O. It turns raw bytes from the sensor into validated
//! [`Sample`]s and defines the [`Reading`] record that the store persists.
//!
//! # Example
//!
//! ```
//! use airq_types::frame;
//!
//! let bytes = [0xAA, 0xC0, 0x0A, 0x00, 0x05, 0x00, 0x00, 0x00, 0x0F];
//! let sample = frame::decode(&bytes)?;
//! assert_eq!(sample.pm25, 1.0);
//! assert_eq!(sample.pm10, 0.5);
//! # Ok::<(), airq_types::DecodeError>(())
//! ```

pub mod error;
pub mod frame;
pub mod types;

pub use error::{DecodeError, DecodeResult};
pub use frame::{FRAME_LEN, HIGH_BYTE_MULTIPLIER, MIN_FRAME_BYTES, decode};
pub use types::{Reading, Sample};
