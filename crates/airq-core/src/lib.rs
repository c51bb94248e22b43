//! Device access and clock sources for SDS011-class particulate sensors.
//!
//! This crate provides the I/O edges of the ingestion pipeline:
//!
//! - **Device access**: the [`SensorDevice`] trait, implemented by
//!   [`SerialDevice`] for a sensor on a USB-serial bridge and by
//!   [`MockDevice`] for tests
//! - **Clocks**: the [`Clock`] trait, with [`SystemClock`] and a
//!   controllable [`ManualClock`]
//!
//! Frame decoding lives in `airq-types` and is re-exported here.
//!
//! # Quick Start
//!
//! ```no_run
//! use airq_core::{SensorDevice, SerialDevice, SerialOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut device = SerialDevice::open("/dev/ttyUSB0", SerialOptions::default())?;
//!
//!     let mut buf = [0u8; airq_core::FRAME_LEN];
//!     let n = device.read(&mut buf).await?;
//!     let sample = airq_core::decode(&buf[..n])?;
//!     println!("{}", sample);
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod device;
pub mod error;
pub mod mock;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{DEFAULT_BAUD_RATE, SerialDevice, SerialOptions};
pub use error::{Error, Result};
pub use mock::{MockDevice, MockDeviceBuilder, MockResponse, MockScript};
pub use traits::SensorDevice;

// Re-export from airq-types
pub use airq_types::{DecodeError, FRAME_LEN, Reading, Sample, decode};
