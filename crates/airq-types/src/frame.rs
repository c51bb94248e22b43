//! Decoding of the sensor's binary measurement frame.
//!
//! The sensor emits a fixed-layout frame roughly once per second:
//!
//! | Offset | Meaning |
//! |--------|---------|
//! | 0 | Header `0xAA` |
//! | 1 | Command `0xC0` (measurement report) |
//! | 2 | PM2.5 low byte |
//! | 3 | PM2.5 high byte |
//! | 4 | PM10 low byte |
//! | 5 | PM10 high byte |
//! | 6-7 | Sensor id (only included in the checksum) |
//! | 8 | Checksum: sum of bytes 2..=7, modulo 256 |
//! | 9 | Tail `0xAB` (not validated) |
//!
//! Only the first [`MIN_FRAME_BYTES`] bytes are consulted, so a longer buffer
//! with the frame at its head decodes the same as the bare frame.

use crate::error::DecodeError;
use crate::types::Sample;

/// Header bytes that open every measurement frame.
pub const FRAME_HEADER: [u8; 2] = [0xAA, 0xC0];

/// Tail byte that closes a frame on the wire.
pub const FRAME_TAIL: u8 = 0xAB;

/// Minimum number of bytes needed to decode a frame.
pub const MIN_FRAME_BYTES: usize = 9;

/// Length of a complete frame on the wire, including the tail byte.
pub const FRAME_LEN: usize = 10;

/// Weight applied to the high byte of each concentration.
///
/// Deployed readings were produced with 255 rather than 256; keeping the
/// historical value keeps new data comparable with what is already stored.
pub const HIGH_BYTE_MULTIPLIER: u32 = 255;

/// Compute the frame checksum over the payload bytes (offsets 2..=7).
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Decode a measurement frame from the head of `data`.
///
/// # Errors
///
/// - [`DecodeError::InsufficientBytes`] if fewer than [`MIN_FRAME_BYTES`] bytes are given.
/// - [`DecodeError::InvalidHeader`] if the buffer does not start with [`FRAME_HEADER`].
/// - [`DecodeError::ChecksumMismatch`] if byte 8 does not match the payload checksum.
#[must_use = "decoding returns a Result that should be handled"]
pub fn decode(data: &[u8]) -> Result<Sample, DecodeError> {
    use bytes::Buf;

    if data.len() < MIN_FRAME_BYTES {
        return Err(DecodeError::InsufficientBytes {
            expected: MIN_FRAME_BYTES,
            actual: data.len(),
        });
    }

    let frame = &data[..MIN_FRAME_BYTES];
    if frame[..2] != FRAME_HEADER {
        return Err(DecodeError::InvalidHeader {
            observed: [frame[0], frame[1]],
        });
    }

    let computed = checksum(&frame[2..8]);
    let expected = frame[8];
    if computed != expected {
        return Err(DecodeError::ChecksumMismatch { computed, expected });
    }

    let mut buf = &frame[2..6];
    let pm25_low = buf.get_u8();
    let pm25_high = buf.get_u8();
    let pm10_low = buf.get_u8();
    let pm10_high = buf.get_u8();

    Ok(Sample {
        pm25: concentration(pm25_low, pm25_high),
        pm10: concentration(pm10_low, pm10_high),
    })
}

/// Build a complete wire frame around a six-byte payload.
///
/// The checksum and tail are filled in. Used by mock devices and tests to
/// produce frames the decoder accepts.
pub fn encode(payload: [u8; 6]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..2].copy_from_slice(&FRAME_HEADER);
    frame[2..8].copy_from_slice(&payload);
    frame[8] = checksum(&payload);
    frame[9] = FRAME_TAIL;
    frame
}

fn concentration(low: u8, high: u8) -> f64 {
    f64::from(u32::from(high) * HIGH_BYTE_MULTIPLIER + u32::from(low)) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: [u8; 9] = [0xAA, 0xC0, 0x0A, 0x00, 0x05, 0x00, 0x00, 0x00, 0x0F];

    #[test]
    fn test_decode_known_frame() {
        let sample = decode(&VALID).unwrap();
        assert_eq!(sample.pm25, 1.0);
        assert_eq!(sample.pm10, 0.5);
    }

    #[test]
    fn test_decode_uses_high_byte_multiplier() {
        // pm25 = (1 * 255 + 2) / 10, pm10 = (3 * 255 + 4) / 10
        let frame = encode([0x02, 0x01, 0x04, 0x03, 0x00, 0x00]);
        let sample = decode(&frame).unwrap();
        assert_eq!(sample.pm25, 25.7);
        assert_eq!(sample.pm10, 76.9);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut buf = VALID.to_vec();
        buf.extend_from_slice(&[0xAB, 0xFF, 0x00, 0x12, 0x34]);
        assert_eq!(decode(&buf).unwrap(), decode(&VALID).unwrap());
    }

    #[test]
    fn test_decode_does_not_validate_tail() {
        let mut frame = encode([0x0A, 0x00, 0x05, 0x00, 0x00, 0x00]);
        frame[9] = 0x00;
        assert!(decode(&frame).is_ok());
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = decode(&VALID[..8]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InsufficientBytes {
                expected: 9,
                actual: 8
            }
        );
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_invalid_header_carries_observed_bytes() {
        let mut frame = VALID;
        frame[1] = 0xC5;
        assert_eq!(
            decode(&frame).unwrap_err(),
            DecodeError::InvalidHeader {
                observed: [0xAA, 0xC5]
            }
        );
    }

    #[test]
    fn test_decode_checksum_mismatch_carries_both_values() {
        let mut frame = VALID;
        frame[8] = 0x10;
        assert_eq!(
            decode(&frame).unwrap_err(),
            DecodeError::ChecksumMismatch {
                computed: 0x0F,
                expected: 0x10
            }
        );
    }

    #[test]
    fn test_header_checked_before_checksum() {
        let mut frame = VALID;
        frame[0] = 0x00;
        frame[8] = 0x00;
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0x01, 0x00, 0x00, 0x00, 0x00]), 0x00);
        assert_eq!(checksum(&[0xFF; 6]), 0xFA);
    }

    #[test]
    fn test_decode_does_not_mutate_input() {
        let frame = VALID;
        let copy = frame;
        let _ = decode(&frame);
        assert_eq!(frame, copy);
    }

    #[test]
    fn test_encode_round_trips_through_decode() {
        let frame = encode([0x64, 0x00, 0xC8, 0x00, 0x12, 0x34]);
        assert_eq!(frame[0], 0xAA);
        assert_eq!(frame[9], FRAME_TAIL);
        let sample = decode(&frame).unwrap();
        assert_eq!(sample.pm25, 10.0);
        assert_eq!(sample.pm10, 20.0);
    }
}

/// Property-based tests for the frame decoder.
///
/// Run with: `cargo test -p airq-types frame::proptests`
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn valid_frames_decode_exactly(payload in any::<[u8; 6]>()) {
            let frame = encode(payload);
            let sample = decode(&frame).unwrap();
            let pm25 = (f64::from(payload[1]) * 255.0 + f64::from(payload[0])) / 10.0;
            let pm10 = (f64::from(payload[3]) * 255.0 + f64::from(payload[2])) / 10.0;
            prop_assert_eq!(sample.pm25, pm25);
            prop_assert_eq!(sample.pm10, pm10);
        }

        #[test]
        fn header_mutation_is_rejected(
            payload in any::<[u8; 6]>(),
            index in 0usize..2,
            delta in 1u8..=255,
        ) {
            let mut frame = encode(payload);
            frame[index] = frame[index].wrapping_add(delta);
            let is_invalid_header = matches!(decode(&frame), Err(DecodeError::InvalidHeader { .. }));
            prop_assert!(is_invalid_header);
        }

        #[test]
        fn payload_mutation_is_rejected(
            payload in any::<[u8; 6]>(),
            index in 2usize..8,
            delta in 1u8..=255,
        ) {
            let mut frame = encode(payload);
            frame[index] = frame[index].wrapping_add(delta);
            let is_mismatch = matches!(decode(&frame), Err(DecodeError::ChecksumMismatch { .. }));
            prop_assert!(is_mismatch);
        }

        #[test]
        fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&data);
        }
    }
}
