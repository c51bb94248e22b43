//! Trait abstractions for sensor device access.
//!
//! This module provides the [`SensorDevice`] trait that abstracts over the
//! real serial port and mock devices for testing.

use async_trait::async_trait;

use crate::error::Result;

/// A byte source attached to a particulate sensor.
///
/// Implementations block (asynchronously) until data is available. A
/// successful read of zero bytes means the endpoint is gone; callers treat it
/// as fatal rather than retrying.
///
/// Reads take `&mut self`: a device has exactly one owner, which is the only
/// task allowed to read from it.
///
/// # Example
///
/// ```ignore
/// use airq_core::{SensorDevice, Result};
///
/// async fn read_frame<D: SensorDevice>(device: &mut D) -> Result<Vec<u8>> {
///     let mut buf = vec![0u8; 10];
///     let n = device.read(&mut buf).await?;
///     buf.truncate(n);
///     Ok(buf)
/// }
/// ```
#[async_trait]
pub trait SensorDevice: Send {
    /// Human-readable identifier (port path or mock name) used in logs.
    fn name(&self) -> &str;

    /// Read bytes into `buf`, returning how many were written.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

#[async_trait]
impl<D: SensorDevice + ?Sized> SensorDevice for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf).await
    }
}
