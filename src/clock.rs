//! # Clock
//!
//! Wall-clock collaborator. Recording only produces records once the time
//! has been set authoritatively (GPS or host sync).

use chrono::{DateTime, Utc};

/// Source of wall-clock time
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Whether `now()` can be trusted
    fn is_time_set(&self) -> bool;
}

/// Host system clock
///
/// Devices without an RTC boot at the epoch; the clock is considered set
/// once it reads later than [`SystemClock::EARLIEST_VALID`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// 2020-01-01T00:00:00Z
    pub const EARLIEST_VALID: i64 = 1_577_836_800;
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_time_set(&self) -> bool {
        self.now().timestamp() > Self::EARLIEST_VALID
    }
}

/// Whole seconds since the epoch, saturated into the log's `u32` field.
pub fn unix_seconds(time: DateTime<Utc>) -> u32 {
    u32::try_from(time.timestamp().max(0)).unwrap_or(u32::MAX)
}
