//! Example: Reading Sensor Frames
//!
//! This example opens an SDS011-class sensor on a serial port and prints
//! a few decoded PM2.5 / PM10 samples.
//!
//! Run with: `cargo run --example read_sensor -- <SERIAL_PORT> [COUNT]`

use std::env;
use std::time::Duration;

use airq_core::{FRAME_LEN, SensorDevice, SerialDevice, SerialOptions, decode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let port = if args.len() > 1 {
        &args[1]
    } else {
        eprintln!("Usage: {} <SERIAL_PORT> [COUNT]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} /dev/ttyUSB0 5", args[0]);
        std::process::exit(1);
    };
    let count: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(3);

    println!("Opening {}...", port);
    let mut device = SerialDevice::open(port, SerialOptions::default())?;

    for i in 1..=count {
        let mut buf = [0u8; FRAME_LEN];
        let n = tokio::time::timeout(Duration::from_secs(5), device.read(&mut buf)).await??;

        match decode(&buf[..n]) {
            Ok(sample) => println!("[{}] PM2.5: {:>6.1} µg/m³  PM10: {:>6.1} µg/m³", i, sample.pm25, sample.pm10),
            Err(e) => println!("[{}] Rejected frame {:02X?}: {}", i, &buf[..n], e),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}
