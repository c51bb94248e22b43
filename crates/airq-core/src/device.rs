//! Serial-port access to the sensor.
//!
//! The sensor sits behind a CH340 USB-serial bridge (`1a86:7523`) and
//! streams one measurement frame per second at 9600 baud, 8N1. Which port
//! it enumerates as is left to the caller.

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use airq_types::frame::{FRAME_HEADER, FRAME_LEN};

use crate::error::{Error, Result};
use crate::traits::SensorDevice;

/// Default baud rate of the sensor's UART.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Options for opening a [`SerialDevice`].
#[derive(Debug, Clone)]
pub struct SerialOptions {
    /// Baud rate. Default: 9600.
    pub baud_rate: u32,
    /// Discard bytes buffered since the previous read before reading.
    ///
    /// The sensor keeps streaming between ticks; without this a read returns
    /// stale frames. Default: `true`.
    pub discard_stale_input: bool,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            discard_stale_input: true,
        }
    }
}

/// A sensor attached to a serial port.
///
/// Each [`read`](SensorDevice::read) aligns on the frame header byte and then
/// fills the buffer up to one frame, so the decoder sees the frame at the
/// head of the buffer.
pub struct SerialDevice {
    path: String,
    port: SerialStream,
    options: SerialOptions,
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish()
    }
}

impl SerialDevice {
    /// Open the serial port at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero baud rate and
    /// [`Error::Serial`] if the port cannot be opened.
    pub fn open(path: &str, options: SerialOptions) -> Result<Self> {
        if options.baud_rate == 0 {
            return Err(Error::invalid_config("baud_rate must be > 0"));
        }

        info!("Opening sensor on {} at {} baud", path, options.baud_rate);
        let port = tokio_serial::new(path, options.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        Ok(Self {
            path: path.to_string(),
            port,
            options,
        })
    }

    /// The port path this device was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl SensorDevice for SerialDevice {
    fn name(&self) -> &str {
        &self.path
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.options.discard_stale_input {
            self.port.clear(ClearBuffer::Input)?;
        }

        let target = buf.len().min(FRAME_LEN);
        let mut filled = 0;

        while filled < target {
            let n = self.port.read(&mut buf[filled..target]).await?;
            if n == 0 {
                break;
            }

            if filled == 0 {
                // Align on the header byte; anything before it is the tail of
                // a frame that was already in flight.
                match buf[..n].iter().position(|b| *b == FRAME_HEADER[0]) {
                    Some(0) => {}
                    Some(start) => {
                        debug!("Skipping {} unaligned byte(s) from {}", start, self.path);
                        buf.copy_within(start..n, 0);
                        filled = n - start;
                        continue;
                    }
                    None => {
                        debug!("Skipping {} unaligned byte(s) from {}", n, self.path);
                        continue;
                    }
                }
            }

            filled += n;
        }

        Ok(filled)
    }
}
