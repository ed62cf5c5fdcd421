//! # Record Encoder
//!
//! Encodes records into their fixed-size little-endian form.

use bytes::{BufMut, BytesMut};

use super::format::*;

/// Encode a single record into `dst`
///
/// Appends exactly [`RECORD_SIZE`] bytes.
///
/// # Arguments
///
/// * `record` - Record to encode
/// * `dst` - Buffer the encoded bytes are appended to
pub fn encode_record_into(record: &Record, dst: &mut BytesMut) {
    dst.reserve(RECORD_SIZE);
    dst.put_u8(record.flags.bits());
    dst.put_u8(record.heartrate);
    dst.put_u8(record.cadence);
    dst.put_i8(record.temperature);
    dst.put_u16_le(record.power);
    dst.put_i16_le(record.altitude);
    dst.put_u32_le(record.timestamp);
    dst.put_i32_le(record.latitude_e7);
    dst.put_i32_le(record.longitude_e7);
}

/// Encode a single record
///
/// # Returns
///
/// * `[u8; RECORD_SIZE]` - Encoded record
///
/// # Examples
///
/// ```
/// use ride_recorder::record::encoder::encode_record;
/// use ride_recorder::record::format::{Record, RECORD_SIZE};
///
/// let bytes = encode_record(&Record::new(1_700_000_000));
/// assert_eq!(bytes.len(), RECORD_SIZE);
/// ```
pub fn encode_record(record: &Record) -> [u8; RECORD_SIZE] {
    let mut buf = BytesMut::with_capacity(RECORD_SIZE);
    encode_record_into(record, &mut buf);

    let mut out = [0u8; RECORD_SIZE];
    out.copy_from_slice(&buf);
    out
}

/// Encode a run of records back to back, ready for a single append.
pub fn encode_records(records: &[Record]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(records.len() * RECORD_SIZE);
    for record in records {
        encode_record_into(record, &mut buf);
    }
    buf
}
