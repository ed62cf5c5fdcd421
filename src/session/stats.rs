//! # Session Statistics
//!
//! Running distance and altitude-gain totals for a session, and the small
//! fixed-size side-file that carries them across restarts.
//!
//! ## Side-file layout
//!
//! ```text
//! Offset  Size  Field
//!  0      8     distance (m, f64 LE)
//!  8      2     altitude gain (m, u16 LE)
//! ```

use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{RecorderError, Result};
use crate::position::Coordinate;
use crate::storage::Filesystem;

/// Encoded size of [`SessionStats`]
pub const STATS_RECORD_SIZE: usize = 10;

/// Default minimum distance step that triggers a notification
pub const DEFAULT_NOTIFY_THRESHOLD_M: f64 = 0.01;

/// Cumulative session totals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SessionStats {
    /// Meters travelled
    pub distance: f64,

    /// Meters climbed
    pub alt_gain: u16,
}

impl SessionStats {
    pub fn to_bytes(&self) -> [u8; STATS_RECORD_SIZE] {
        let mut buf = BytesMut::with_capacity(STATS_RECORD_SIZE);
        buf.put_f64_le(self.distance);
        buf.put_u16_le(self.alt_gain);

        let mut out = [0u8; STATS_RECORD_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode a side-file image
    ///
    /// # Errors
    ///
    /// Returns error if the image is the wrong size or the distance is not a
    /// finite, non-negative number.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != STATS_RECORD_SIZE {
            return Err(RecorderError::InvalidRecord(format!(
                "stats record must be {} bytes, got {}",
                STATS_RECORD_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let distance = buf.get_f64_le();
        let alt_gain = buf.get_u16_le();

        if !distance.is_finite() || distance < 0.0 {
            return Err(RecorderError::InvalidRecord(format!(
                "stats distance out of range: {}",
                distance
            )));
        }

        Ok(Self { distance, alt_gain })
    }
}

/// Accumulates session totals from successive fixes
#[derive(Debug)]
pub struct StatsAccumulator {
    stats: SessionStats,
    last_fix: Option<Coordinate>,
    last_altitude: Option<i16>,
    notify_threshold: f64,
    merged_from: Option<PathBuf>,
    distance_tx: watch::Sender<f64>,
}

impl StatsAccumulator {
    /// Create an accumulator
    ///
    /// # Arguments
    ///
    /// * `notify_threshold` - Distance steps at or below this many meters
    ///   are added silently, without notifying subscribers
    pub fn new(notify_threshold: f64) -> Self {
        let (distance_tx, _) = watch::channel(0.0);
        Self {
            stats: SessionStats::default(),
            last_fix: None,
            last_altitude: None,
            notify_threshold,
            merged_from: None,
            distance_tx,
        }
    }

    /// Receive the running distance whenever it grows past the noise threshold.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.distance_tx.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Account for a new position fix
    ///
    /// The first valid fix only seeds the accumulator. Invalid fixes are
    /// ignored and the last valid fix is kept as the reference point.
    ///
    /// # Arguments
    ///
    /// * `fix` - Current fix, `None` when invalid
    /// * `distance` - Great-circle distance function
    ///
    /// # Returns
    ///
    /// * `f64` - Meters added by this fix
    pub fn update_position<D>(&mut self, fix: Option<Coordinate>, distance: D) -> f64
    where
        D: Fn(Coordinate, Coordinate) -> f64,
    {
        let Some(fix) = fix else {
            return 0.0;
        };

        let delta = match self.last_fix.replace(fix) {
            Some(previous) => distance(previous, fix),
            None => return 0.0,
        };

        if !delta.is_finite() || delta <= 0.0 {
            return 0.0;
        }

        self.stats.distance += delta;
        if delta > self.notify_threshold {
            self.distance_tx.send_replace(self.stats.distance);
        }
        delta
    }

    /// Account for a new altitude reading
    ///
    /// Only climbs count; descents move the reference point down without
    /// reducing the gain.
    ///
    /// # Returns
    ///
    /// * `u16` - Meters of gain added by this reading
    pub fn update_altitude(&mut self, altitude: Option<i16>) -> u16 {
        let Some(altitude) = altitude else {
            return 0;
        };

        let Some(previous) = self.last_altitude.replace(altitude) else {
            return 0;
        };

        let climb = i32::from(altitude) - i32::from(previous);
        if climb <= 0 {
            return 0;
        }

        let climb = u16::try_from(climb).unwrap_or(u16::MAX);
        self.stats.alt_gain = self.stats.alt_gain.saturating_add(climb);
        climb
    }

    /// Merge a persisted snapshot into the running totals
    ///
    /// The snapshot is added, not substituted, so totals gathered before the
    /// load are kept. A snapshot is merged at most once per path until the
    /// next [`reset`](Self::reset).
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `true` if a snapshot was merged
    ///
    /// # Errors
    ///
    /// Returns error if the side-file exists but cannot be read or decoded.
    pub fn load(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<bool> {
        if self.merged_from.as_deref() == Some(path) {
            warn!("Stats from {} already merged, skipping", path.display());
            return Ok(false);
        }

        if !fs.exists(path) {
            debug!("No stats file at {}", path.display());
            return Ok(false);
        }

        let snapshot = SessionStats::from_bytes(&fs.read(path)?)?;
        self.stats.distance += snapshot.distance;
        self.stats.alt_gain = self.stats.alt_gain.saturating_add(snapshot.alt_gain);
        self.merged_from = Some(path.to_path_buf());
        self.distance_tx.send_replace(self.stats.distance);

        info!(
            "Merged stats from {}: distance {:.1} m, gain {} m",
            path.display(),
            self.stats.distance,
            self.stats.alt_gain
        );
        Ok(true)
    }

    /// Overwrite the side-file with the current totals.
    pub fn save(&self, fs: &dyn Filesystem, path: &Path) -> Result<()> {
        fs.write(path, &self.stats.to_bytes())?;
        debug!("Saved stats to {}", path.display());
        Ok(())
    }

    /// Zero the totals and forget the reference fixes.
    pub fn reset(&mut self) {
        self.stats = SessionStats::default();
        self.last_fix = None;
        self.last_altitude = None;
        self.merged_from = None;
        self.distance_tx.send_replace(0.0);
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_THRESHOLD_M)
    }
}
