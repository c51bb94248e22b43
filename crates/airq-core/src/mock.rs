//! Mock device implementation for testing.
//!
//! This module provides a scripted device that can be used for unit testing
//! without a sensor attached.
//!
//! # Features
//!
//! - **Scripted responses**: queue frames, I/O errors, or end-of-stream
//! - **Live scripting**: push responses through a [`MockScript`] handle after the
//!   device has been moved into a polling loop
//! - **Latency simulation**: delay every read to exercise timeouts
//!
//! When the script is empty, reads wait forever, like a quiet serial port.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use airq_types::frame;

use crate::error::Result;
use crate::traits::SensorDevice;

/// One scripted outcome of a [`MockDevice`] read.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Deliver these bytes (truncated to the caller's buffer).
    Bytes(Vec<u8>),
    /// Fail with an I/O error of this kind.
    IoError(std::io::ErrorKind),
    /// Return a successful zero-byte read.
    Eof,
    /// Never complete.
    Hang,
}

impl MockResponse {
    /// A valid frame carrying raw PM2.5 and PM10 values in tenths of µg/m³.
    ///
    /// Values below 255 decode exactly to `raw / 10`.
    pub fn frame(pm25_raw: u8, pm10_raw: u8) -> Self {
        Self::Bytes(frame::encode([pm25_raw, 0, pm10_raw, 0, 0, 0]).to_vec())
    }
}

#[derive(Debug, Default)]
struct ScriptInner {
    responses: Mutex<VecDeque<MockResponse>>,
    reads: AtomicU32,
}

/// Shared handle to a mock device's script.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    inner: Arc<ScriptInner>,
}

impl MockScript {
    /// Queue a response at the end of the script.
    pub fn push(&self, response: MockResponse) {
        self.lock().push_back(response);
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Number of reads issued against the device so far.
    pub fn read_count(&self) -> u32 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    fn pop(&self) -> Option<MockResponse> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<MockResponse>> {
        // A poisoned queue still holds valid responses.
        self.inner
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A mock sensor device for testing.
///
/// # Example
///
/// ```
/// use airq_core::{MockDevice, MockResponse, SensorDevice};
///
/// #[tokio::main]
/// async fn main() {
///     let mut device = MockDevice::builder()
///         .response(MockResponse::frame(100, 50))
///         .build();
///
///     let mut buf = [0u8; 10];
///     let n = device.read(&mut buf).await.unwrap();
///     assert_eq!(n, 10);
///     assert_eq!(buf[0], 0xAA);
/// }
/// ```
#[derive(Debug)]
pub struct MockDevice {
    name: String,
    script: MockScript,
    latency: Duration,
}

impl MockDevice {
    /// Create a mock device with an empty script.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: MockScript::default(),
            latency: Duration::ZERO,
        }
    }

    /// Create a builder for a mock device.
    pub fn builder() -> MockDeviceBuilder {
        MockDeviceBuilder::default()
    }

    /// Handle for scripting this device after it has been moved.
    pub fn script(&self) -> MockScript {
        self.script.clone()
    }
}

#[async_trait]
impl SensorDevice for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.script.inner.reads.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.script.pop() {
            Some(MockResponse::Bytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(MockResponse::IoError(kind)) => {
                Err(std::io::Error::new(kind, "mock read failure").into())
            }
            Some(MockResponse::Eof) => Ok(0),
            Some(MockResponse::Hang) | None => std::future::pending().await,
        }
    }
}

/// Builder for [`MockDevice`].
#[derive(Debug)]
pub struct MockDeviceBuilder {
    name: String,
    responses: Vec<MockResponse>,
    latency: Duration,
}

impl Default for MockDeviceBuilder {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Vec::new(),
            latency: Duration::ZERO,
        }
    }
}

impl MockDeviceBuilder {
    /// Set the device name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Queue a response.
    #[must_use]
    pub fn response(mut self, response: MockResponse) -> Self {
        self.responses.push(response);
        self
    }

    /// Delay every read by `latency`.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Build the mock device.
    pub fn build(self) -> MockDevice {
        let device = MockDevice {
            name: self.name,
            script: MockScript::default(),
            latency: self.latency,
        };
        for response in self.responses {
            device.script.push(response);
        }
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_mock_delivers_frames_in_order() {
        let mut device = MockDevice::builder()
            .response(MockResponse::frame(100, 50))
            .response(MockResponse::frame(125, 60))
            .build();

        let mut buf = [0u8; 10];
        device.read(&mut buf).await.unwrap();
        assert_eq!(airq_types::decode(&buf).unwrap().pm25, 10.0);

        device.read(&mut buf).await.unwrap();
        assert_eq!(airq_types::decode(&buf).unwrap().pm25, 12.5);

        assert_eq!(device.script().read_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_truncates_to_buffer() {
        let mut device = MockDevice::builder()
            .response(MockResponse::Bytes(vec![1, 2, 3, 4]))
            .build();

        let mut buf = [0u8; 2];
        assert_eq!(device.read(&mut buf).await.unwrap(), 2);
        assert_eq!(buf, [1, 2]);
    }

    #[tokio::test]
    async fn test_mock_errors_and_eof() {
        let mut device = MockDevice::builder()
            .response(MockResponse::IoError(std::io::ErrorKind::TimedOut))
            .response(MockResponse::Eof)
            .build();

        let mut buf = [0u8; 10];
        let err = device.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_script_handle_after_move() {
        let device = MockDevice::new("moved");
        let script = device.script();
        let mut boxed: Box<dyn SensorDevice> = Box::new(device);

        script.push(MockResponse::frame(10, 5));
        assert_eq!(script.remaining(), 1);

        let mut buf = [0u8; 10];
        assert_eq!(boxed.read(&mut buf).await.unwrap(), 10);
        assert_eq!(boxed.name(), "moved");
        assert_eq!(script.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_script_hangs() {
        let mut device = MockDevice::new("quiet");
        let mut buf = [0u8; 10];
        let result =
            tokio::time::timeout(Duration::from_secs(5), device.read(&mut buf)).await;
        assert!(result.is_err());
    }
}
