//! # Record Decoder
//!
//! Decodes fixed-size records read back from a session log.

use bytes::Buf;

use super::format::*;
use crate::error::{RecorderError, Result};

/// Decode one record
///
/// # Arguments
///
/// * `bytes` - Exactly [`RECORD_SIZE`] bytes
///
/// # Returns
///
/// * `Result<Record>` - Decoded record, or error if invalid
///
/// # Errors
///
/// Returns error if:
/// - The slice is not exactly one record long
/// - The flags byte carries undefined bits
pub fn decode_record(bytes: &[u8]) -> Result<Record> {
    if bytes.len() != RECORD_SIZE {
        return Err(RecorderError::InvalidRecord(format!(
            "expected {} bytes, got {}",
            RECORD_SIZE,
            bytes.len()
        )));
    }

    let mut buf = bytes;
    let raw_flags = buf.get_u8();
    let flags = RecordFlags::from_bits(raw_flags).ok_or_else(|| {
        RecorderError::InvalidRecord(format!("undefined flag bits: 0x{:02X}", raw_flags))
    })?;

    let heartrate = buf.get_u8();
    let cadence = buf.get_u8();
    let temperature = buf.get_i8();
    let power = buf.get_u16_le();
    let altitude = buf.get_i16_le();
    let timestamp = buf.get_u32_le();
    let latitude_e7 = buf.get_i32_le();
    let longitude_e7 = buf.get_i32_le();

    Ok(Record {
        flags,
        timestamp,
        latitude_e7,
        longitude_e7,
        altitude,
        power,
        cadence,
        heartrate,
        temperature,
    })
}

/// Decode a whole log image
///
/// Invalid records are skipped. A trailing partial record is ignored.
///
/// # Returns
///
/// * `Vec<Record>` - Every decodable record, in file order
pub fn decode_records(bytes: &[u8]) -> Vec<Record> {
    bytes
        .chunks_exact(RECORD_SIZE)
        .filter_map(|chunk| decode_record(chunk).ok())
        .collect()
}

/// Whether a log of `len` bytes holds a whole number of records
#[inline]
pub fn is_whole_records(len: u64) -> bool {
    len % RECORD_SIZE as u64 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encoder::{encode_record, encode_records};

    fn sample_record(timestamp: u32) -> Record {
        let mut record = Record::new(timestamp);
        record.set_location(47.3769, 8.5417);
        record.set_altitude(408);
        record.set_power(212);
        record.set_cadence(88);
        record.set_heartrate(151);
        record
    }

    #[test]
    fn test_decode_wrong_length() {
        assert!(decode_record(&[0u8; RECORD_SIZE - 1]).is_err());
        assert!(decode_record(&[0u8; RECORD_SIZE + 1]).is_err());
    }

    #[test]
    fn test_decode_undefined_flags() {
        let mut bytes = encode_record(&sample_record(5));
        bytes[OFFSET_FLAGS] |= 0x80;

        match decode_record(&bytes) {
            Err(RecorderError::InvalidRecord(msg)) => assert!(msg.contains("0x")),
            other => panic!("Expected InvalidRecord, got: {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let records: Vec<Record> = (0..25).map(|i| sample_record(1_700_000_000 + i)).collect();
        let bytes = encode_records(&records);

        assert_eq!(decode_records(&bytes), records);
    }

    #[test]
    fn test_round_trip_extremes() {
        let record = Record {
            flags: RecordFlags::ALL,
            timestamp: u32::MAX,
            latitude_e7: -900_000_000,
            longitude_e7: 1_800_000_000,
            altitude: i16::MIN,
            power: u16::MAX,
            cadence: u8::MAX,
            heartrate: u8::MAX,
            temperature: i8::MIN,
        };

        assert_eq!(decode_record(&encode_record(&record)).unwrap(), record);
    }

    #[test]
    fn test_decode_records_skips_invalid_and_partial() {
        let mut bytes = encode_records(&[sample_record(1), sample_record(2), sample_record(3)]).to_vec();
        bytes[RECORD_SIZE + OFFSET_FLAGS] = 0xFF;
        bytes.extend_from_slice(&[0u8; 7]);

        let decoded = decode_records(&bytes);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].timestamp, 1);
        assert_eq!(decoded[1].timestamp, 3);
    }

    #[test]
    fn test_is_whole_records() {
        assert!(is_whole_records(0));
        assert!(is_whole_records(RECORD_SIZE as u64 * 7));
        assert!(!is_whole_records(RECORD_SIZE as u64 * 7 + 3));
    }
}
