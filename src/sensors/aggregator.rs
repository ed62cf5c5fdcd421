//! # Sample Aggregator
//!
//! Collects power, cadence and heart-rate samples pushed from sensor
//! notification tasks and hands the recorder one averaged value per tick.
//!
//! Each channel has its own ring behind its own lock, so a slow heart-rate
//! strap never stalls a power meter. Every lock acquisition is bounded by
//! the configured timeout: producers drop the sample and get an error,
//! the recorder simply sees no data for that channel this tick.

use std::fmt;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::ring::SampleRing;
use crate::error::{RecorderError, Result};

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Sensor channel fed into the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleChannel {
    Power,
    Cadence,
    HeartRate,
}

impl SampleChannel {
    pub const ALL: [SampleChannel; 3] = [
        SampleChannel::Power,
        SampleChannel::Cadence,
        SampleChannel::HeartRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SampleChannel::Power => "power",
            SampleChannel::Cadence => "cadence",
            SampleChannel::HeartRate => "heart rate",
        }
    }
}

impl fmt::Display for SampleChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three independently locked sample rings
#[derive(Debug)]
pub struct SampleAggregator {
    power: Mutex<SampleRing>,
    cadence: Mutex<SampleRing>,
    heartrate: Mutex<SampleRing>,
    lock_timeout: Duration,
}

impl SampleAggregator {
    /// Create an aggregator
    ///
    /// # Arguments
    ///
    /// * `capacity` - Samples kept per channel before the oldest is evicted
    /// * `lock_timeout` - Upper bound on waiting for a channel lock
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use ride_recorder::sensors::{SampleAggregator, SampleChannel};
    ///
    /// # tokio_test::block_on(async {
    /// let aggregator = SampleAggregator::new(16, Duration::from_millis(100));
    /// aggregator.push(SampleChannel::Power, 200).await.unwrap();
    /// aggregator.push(SampleChannel::Power, 220).await.unwrap();
    ///
    /// let avg = aggregator.drain_average(SampleChannel::Power, true).await;
    /// assert_eq!(avg, Some(210.0));
    /// # });
    /// ```
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            power: Mutex::new(SampleRing::new(capacity)),
            cadence: Mutex::new(SampleRing::new(capacity)),
            heartrate: Mutex::new(SampleRing::new(capacity)),
            lock_timeout,
        }
    }

    fn ring(&self, channel: SampleChannel) -> &Mutex<SampleRing> {
        match channel {
            SampleChannel::Power => &self.power,
            SampleChannel::Cadence => &self.cadence,
            SampleChannel::HeartRate => &self.heartrate,
        }
    }

    async fn lock(&self, channel: SampleChannel) -> Option<MutexGuard<'_, SampleRing>> {
        timeout(self.lock_timeout, self.ring(channel).lock()).await.ok()
    }

    /// Record one sample
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the channel lock could not be taken in time;
    /// the sample is dropped.
    pub async fn push(&self, channel: SampleChannel, value: u16) -> Result<()> {
        let Some(mut ring) = self.lock(channel).await else {
            warn!("Dropping {} sample {}: lock timeout", channel, value);
            return Err(RecorderError::LockTimeout(channel));
        };

        if let Some(evicted) = ring.push(value) {
            debug!("{} ring full, evicted {}", channel, evicted);
        }
        Ok(())
    }

    /// Average of the buffered samples for `channel`
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel to average
    /// * `clear` - Empty the ring after reading
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - Mean, or `None` when the ring is empty or the lock
    ///   timed out
    pub async fn drain_average(&self, channel: SampleChannel, clear: bool) -> Option<f64> {
        let Some(mut ring) = self.lock(channel).await else {
            warn!("No {} average this tick: lock timeout", channel);
            return None;
        };

        let mean = ring.mean();
        if clear {
            ring.clear();
        }
        mean
    }
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new(16, DEFAULT_LOCK_TIMEOUT)
    }
}
