//! Key and record encoding.

use std::fmt;
use std::str::FromStr;

use airq_types::Reading;

use crate::error::{Error, Result};

/// Width of an encoded key in digits.
pub const KEY_WIDTH: usize = 20;

/// Key of a stored reading.
///
/// Keys are the reading id rendered as a zero-padded decimal of
/// [`KEY_WIDTH`] digits, so lexicographic key order equals id order and
/// therefore insertion order. `u64::MAX` has exactly 20 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleKey(u64);

impl SampleKey {
    /// The smallest possible key.
    pub const MIN: Self = Self(0);
    /// The largest possible key.
    pub const MAX: Self = Self(u64::MAX);

    /// Key for the reading with the given id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The reading id this key was derived from.
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = KEY_WIDTH)
    }
}

impl From<u64> for SampleKey {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Error parsing a [`SampleKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sample key {0:?}: expected 20 decimal digits")]
pub struct ParseKeyError(String);

impl FromStr for SampleKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != KEY_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseKeyError(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ParseKeyError(s.to_string()))
    }
}

/// Encode a reading as its stored value.
pub(crate) fn encode_value(reading: &Reading) -> Result<String> {
    Ok(serde_json::to_string(reading)?)
}

/// Decode a stored value, attributing failures to `key`.
pub(crate) fn decode_value(key: &str, value: &str) -> Result<Reading> {
    serde_json::from_str(value).map_err(|e| Error::CorruptRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a key column, attributing failures to the raw value.
pub(crate) fn parse_key(raw: &str) -> Result<SampleKey> {
    raw.parse().map_err(|e: ParseKeyError| Error::CorruptRecord {
        key: raw.to_string(),
        reason: e.to_string(),
    })
}
