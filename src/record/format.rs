//! # Record Format Constants and Types
//!
//! Core definitions for the fixed-size binary session log.
//!
//! ## Layout
//!
//! Every record occupies exactly [`RECORD_SIZE`] bytes, little-endian:
//!
//! ```text
//! Offset  Size  Field
//!  0      1     flags
//!  1      1     heartrate (bpm)
//!  2      1     cadence (rpm)
//!  3      1     temperature (reserved)
//!  4      2     power (W)
//!  6      2     altitude (m, signed)
//!  8      4     timestamp (s since epoch)
//! 12      4     latitude  (deg × 10^7, signed)
//! 16      4     longitude (deg × 10^7, signed)
//! ```

use chrono::{DateTime, Utc};

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 20;

/// Fixed-point scale applied to latitude and longitude
pub const COORD_SCALE: f64 = 10_000_000.0;

/// Field offsets within an encoded record
pub const OFFSET_FLAGS: usize = 0;
pub const OFFSET_HEARTRATE: usize = 1;
pub const OFFSET_CADENCE: usize = 2;
pub const OFFSET_TEMPERATURE: usize = 3;
pub const OFFSET_POWER: usize = 4;
pub const OFFSET_ALTITUDE: usize = 6;
pub const OFFSET_TIMESTAMP: usize = 8;
pub const OFFSET_LATITUDE: usize = 12;
pub const OFFSET_LONGITUDE: usize = 16;

/// Bitmask of fields that were valid when a record was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RecordFlags(u8);

impl RecordFlags {
    pub const LOCATION: RecordFlags = RecordFlags(0x01);
    pub const ALTITUDE: RecordFlags = RecordFlags(0x02);
    pub const POWER: RecordFlags = RecordFlags(0x04);
    pub const CADENCE: RecordFlags = RecordFlags(0x08);
    pub const HEARTRATE: RecordFlags = RecordFlags(0x10);
    /// Reserved, never set by the recorder
    pub const TEMPERATURE: RecordFlags = RecordFlags(0x20);
    /// Reserved, never set by the recorder
    pub const LAP: RecordFlags = RecordFlags(0x40);

    /// Every bit a well-formed record may carry
    pub const ALL: RecordFlags = RecordFlags(0x7F);

    #[must_use]
    pub const fn empty() -> Self {
        RecordFlags(0)
    }

    /// Build flags from a raw byte, rejecting undefined bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(RecordFlags(bits))
        }
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RecordFlags) {
        self.0 |= other.0;
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        RecordFlags(self.0 | rhs.0)
    }
}

/// One timestamped sample snapshot in the session log
///
/// Fields other than `flags` and `timestamp` are only meaningful when the
/// matching flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Record {
    /// Which fields were valid at capture time
    pub flags: RecordFlags,

    /// Seconds since the Unix epoch
    pub timestamp: u32,

    /// Latitude in degrees × 10^7
    pub latitude_e7: i32,

    /// Longitude in degrees × 10^7
    pub longitude_e7: i32,

    /// Altitude in meters
    pub altitude: i16,

    /// Power in watts
    pub power: u16,

    /// Cadence in rpm
    pub cadence: u8,

    /// Heart rate in bpm
    pub heartrate: u8,

    /// Reserved
    pub temperature: i8,
}

impl Record {
    /// Create an empty record stamped with `timestamp`.
    #[must_use]
    pub fn new(timestamp: u32) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Set the location and raise the location flag.
    pub fn set_location(&mut self, latitude: f64, longitude: f64) {
        self.latitude_e7 = (latitude * COORD_SCALE).round() as i32;
        self.longitude_e7 = (longitude * COORD_SCALE).round() as i32;
        self.flags.insert(RecordFlags::LOCATION);
    }

    pub fn set_altitude(&mut self, altitude: i16) {
        self.altitude = altitude;
        self.flags.insert(RecordFlags::ALTITUDE);
    }

    pub fn set_power(&mut self, power: u16) {
        self.power = power;
        self.flags.insert(RecordFlags::POWER);
    }

    pub fn set_cadence(&mut self, cadence: u8) {
        self.cadence = cadence;
        self.flags.insert(RecordFlags::CADENCE);
    }

    pub fn set_heartrate(&mut self, heartrate: u8) {
        self.heartrate = heartrate;
        self.flags.insert(RecordFlags::HEARTRATE);
    }

    /// Latitude in degrees
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude_e7 as f64 / COORD_SCALE
    }

    /// Longitude in degrees
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude_e7 as f64 / COORD_SCALE
    }

    /// Timestamp as a UTC date-time, `None` if the record was never stamped.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        if self.timestamp == 0 {
            return None;
        }
        DateTime::from_timestamp(i64::from(self.timestamp), 0)
    }
}
