//! Core types for particulate-matter readings.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Concentrations decoded from a single sensor frame.
///
/// A sample has no identity and no timestamp yet: the sensor transmits
/// neither. Both are assigned when the sample is persisted as a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// PM2.5 concentration in µg/m³.
    pub pm25: f64,
    /// PM10 concentration in µg/m³.
    pub pm10: f64,
}

impl Sample {
    /// Create a sample from concentrations in µg/m³.
    pub fn new(pm25: f64, pm10: f64) -> Self {
        Self { pm25, pm10 }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pm2.5={:.1} pm10={:.1}", self.pm25, self.pm10)
    }
}

/// A persisted air-quality reading.
///
/// Readings are immutable once written. `id` is assigned by the store and is
/// strictly increasing in write order; `created_at` is the UTC write time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Store-assigned sequence number, starting at 1.
    pub id: u64,
    /// PM2.5 concentration in µg/m³.
    pub pm25: f64,
    /// PM10 concentration in µg/m³.
    pub pm10: f64,
    /// When the reading was written.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
}

impl Reading {
    /// Attach an id and write time to a decoded sample.
    pub fn from_sample(id: u64, sample: Sample, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            pm25: sample.pm25,
            pm10: sample.pm10,
            created_at,
        }
    }

    /// The concentrations of this reading, without identity.
    pub fn sample(&self) -> Sample {
        Sample::new(self.pm25, self.pm10)
    }
}
