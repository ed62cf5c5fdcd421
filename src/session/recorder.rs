//! # Session Recorder
//!
//! Lifecycle state machine for one recording session.
//!
//! ```text
//!           start            pause
//!   Idle ─────────▶ Recording ─────▶ Paused
//!    ▲                │   ▲   start     │
//!    │      end       │   └─────────────┘
//!    └────────────────┴──────── end ────┘
//! ```
//!
//! Each `tick` captures one record from the clock, the position source and
//! the sample aggregator. Records are buffered and appended to the session
//! log whenever the buffer fills, and on `pause` and `end`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::paths::SessionPaths;
use super::stats::StatsAccumulator;
use crate::clock::{unix_seconds, Clock};
use crate::config::Config;
use crate::error::{RecorderError, Result};
use crate::export::GpxExporter;
use crate::position::PositionSource;
use crate::record::Record;
use crate::sensors::{SampleAggregator, SampleChannel};
use crate::storage::{Filesystem, RecordBuffer};

/// Recording lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
}

/// Why a tick produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No session is recording
    NotRecording,
    /// Wall-clock time has not been set yet
    ClockNotSet,
    /// The rider is not moving
    Stationary,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A record was buffered; `flushed` records reached the log this tick
    Recorded { flushed: usize },
    Skipped(SkipReason),
}

/// What `end` left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSummary {
    /// Finished session log, `None` if nothing was ever written
    pub log_path: Option<PathBuf>,

    /// Exported track, `None` if export was disabled or failed
    pub track_path: Option<PathBuf>,
}

/// Snapshot for the command layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    /// True only while recording. A paused session reports `false` and is
    /// told apart from an idle one by `state` and `log_path`.
    pub active: bool,
    pub state: SessionState,
    pub log_path: Option<String>,
    pub buffered: usize,
    pub distance_m: f64,
    pub alt_gain_m: u16,
}

/// Recording session engine
pub struct Recorder {
    state: SessionState,
    log_path: Option<PathBuf>,
    buffer: RecordBuffer,
    stats: StatsAccumulator,
    paths: SessionPaths,
    aggregator: Arc<SampleAggregator>,
    exporter: GpxExporter,
    export_on_end: bool,
    fs: Option<Arc<dyn Filesystem>>,
    clock: Option<Arc<dyn Clock>>,
    position: Option<Arc<dyn PositionSource>>,
}

impl Recorder {
    /// Create an idle recorder
    ///
    /// Collaborators are attached with the `with_*` builders; `start` fails
    /// until all three are present.
    pub fn new(config: &Config) -> Self {
        Self {
            state: SessionState::Idle,
            log_path: None,
            buffer: RecordBuffer::new(config.recorder.buffer_capacity),
            stats: StatsAccumulator::new(config.stats.distance_notify_threshold_m),
            paths: SessionPaths::from_config(&config.storage),
            aggregator: Arc::new(SampleAggregator::new(
                config.recorder.sample_capacity,
                config.recorder.lock_timeout(),
            )),
            exporter: GpxExporter::from_config(&config.export),
            export_on_end: config.export.export_on_end,
            fs: None,
            clock: None,
            position: None,
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_position_source(mut self, position: Arc<dyn PositionSource>) -> Self {
        self.position = Some(position);
        self
    }

    /// Handle for sample producers
    pub fn aggregator(&self) -> Arc<SampleAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Running distance, updated when it grows past the noise threshold
    pub fn subscribe_distance(&self) -> watch::Receiver<f64> {
        self.stats.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Records captured but not yet flushed
    pub fn buffered(&self) -> &[Record] {
        self.buffer.records()
    }

    pub fn status(&self) -> SessionStatus {
        let stats = self.stats.stats();
        SessionStatus {
            active: self.state == SessionState::Recording,
            state: self.state,
            log_path: self.log_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            buffered: self.buffer.len(),
            distance_m: stats.distance,
            alt_gain_m: stats.alt_gain,
        }
    }

    fn filesystem(&self) -> Result<Arc<dyn Filesystem>> {
        self.fs
            .clone()
            .ok_or(RecorderError::MissingCollaborator("filesystem"))
    }

    fn collaborators(&self) -> Result<(Arc<dyn Filesystem>, Arc<dyn Clock>, Arc<dyn PositionSource>)> {
        let fs = self.filesystem()?;
        let clock = self
            .clock
            .clone()
            .ok_or(RecorderError::MissingCollaborator("clock"))?;
        let position = self
            .position
            .clone()
            .ok_or(RecorderError::MissingCollaborator("position source"))?;
        Ok((fs, clock, position))
    }

    /// Start a session, or resume a paused one
    ///
    /// A fresh recorder adopts the log named by the continuation pointer when
    /// that log is intact, merging its persisted stats. Otherwise the log is
    /// named on the first flush.
    ///
    /// # Errors
    ///
    /// Returns `MissingCollaborator` if the filesystem, clock or position
    /// source was never attached. The recorder stays idle.
    pub fn start(&mut self) -> Result<()> {
        let (fs, _, _) = self.collaborators().map_err(|e| {
            error!("Cannot start recording: {}", e);
            e
        })?;

        if self.state == SessionState::Recording {
            debug!("Already recording");
            return Ok(());
        }

        if self.log_path.is_none() {
            if let Some(log) = self.paths.resume_target(fs.as_ref()) {
                let stats_path = self.paths.stats_path(&log);
                if let Err(e) = self.stats.load(fs.as_ref(), &stats_path) {
                    warn!("Ignoring stats for {}: {}", log.display(), e);
                }
                self.log_path = Some(log);
            }
        }

        let resumed = self.state == SessionState::Paused;
        self.state = SessionState::Recording;
        match (&self.log_path, resumed) {
            (_, true) => info!("Recording resumed"),
            (Some(log), false) => info!("Recording started, continuing {}", log.display()),
            (None, false) => info!("Recording started"),
        }
        Ok(())
    }

    /// Pause the session
    ///
    /// Buffered records are flushed and stats persisted. The continuation
    /// pointer and the running totals are kept, so `start` picks the same log
    /// back up.
    ///
    /// # Errors
    ///
    /// Returns `NotRecording` when idle, or the flush/save error; the session
    /// keeps recording in that case.
    pub fn pause(&mut self) -> Result<()> {
        let fs = self.filesystem()?;
        match self.state {
            SessionState::Idle => return Err(RecorderError::NotRecording),
            SessionState::Paused => return Ok(()),
            SessionState::Recording => {}
        }

        self.flush(fs.as_ref())?;
        self.save_stats(fs.as_ref())?;

        self.state = SessionState::Paused;
        info!("Recording paused");
        Ok(())
    }

    /// End the session
    ///
    /// Flushes, persists stats, removes the continuation pointer and exports
    /// the finished log. The next `start` begins a new session.
    ///
    /// # Errors
    ///
    /// Returns `NotRecording` when idle. A flush, stats or pointer failure
    /// aborts with the session untouched. Export failures are only logged.
    pub fn end(&mut self) -> Result<EndSummary> {
        let fs = self.filesystem()?;
        if self.state == SessionState::Idle {
            return Err(RecorderError::NotRecording);
        }

        self.flush(fs.as_ref())?;
        self.save_stats(fs.as_ref())?;
        self.paths.clear_continuation(fs.as_ref())?;

        let track_path = match &self.log_path {
            Some(log) if self.export_on_end => match self.exporter.export_default(fs.as_ref(), log) {
                Ok(track) => Some(track),
                Err(e) => {
                    error!("Export of {} failed: {}", log.display(), e);
                    None
                }
            },
            _ => None,
        };

        let stats = self.stats.stats();
        let log_path = self.log_path.take();
        self.stats.reset();
        self.buffer.reset();
        self.state = SessionState::Idle;

        info!(
            "Recording ended: distance {:.1} m, gain {} m",
            stats.distance, stats.alt_gain
        );
        Ok(EndSummary {
            log_path,
            track_path,
        })
    }

    /// Capture one record
    ///
    /// Does nothing unless recording, the clock is set and the rider is
    /// moving. A buffer left full by a failed flush is flushed first; if that
    /// fails again the period is skipped and channel samples stay buffered.
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator is missing, or the flush fails. The
    /// records stay buffered for the next tick.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        if self.state != SessionState::Recording {
            return Ok(TickOutcome::Skipped(SkipReason::NotRecording));
        }

        let (fs, clock, position) = self.collaborators()?;
        if !clock.is_time_set() {
            debug!("Clock not set, skipping tick");
            return Ok(TickOutcome::Skipped(SkipReason::ClockNotSet));
        }
        if !position.is_moving() {
            return Ok(TickOutcome::Skipped(SkipReason::Stationary));
        }

        let mut flushed = 0;
        if self.buffer.is_full() {
            info!("Retrying flush of {} buffered records", self.buffer.len());
            flushed += self.flush(fs.as_ref())?;
        }

        let record = self.capture(clock.as_ref(), position.as_ref()).await;
        if self.buffer.append(record)? {
            flushed += self.flush(fs.as_ref()).map_err(|e| {
                warn!("Flush failed, records kept for the next tick: {}", e);
                e
            })?;
        }

        Ok(TickOutcome::Recorded { flushed })
    }

    async fn capture(&mut self, clock: &dyn Clock, position: &dyn PositionSource) -> Record {
        let mut record = Record::new(unix_seconds(clock.now()));

        let fix = position.fix();
        if let Some(fix) = fix {
            record.set_location(fix.latitude, fix.longitude);
        }
        self.stats.update_position(fix, |a, b| position.distance(a, b));

        let altitude = position.altitude();
        if let Some(altitude) = altitude {
            record.set_altitude(altitude);
        }
        self.stats.update_altitude(altitude);

        if let Some(power) = self.aggregator.drain_average(SampleChannel::Power, true).await {
            record.set_power(round_to_u16(power));
        }
        if let Some(cadence) = self.aggregator.drain_average(SampleChannel::Cadence, true).await {
            record.set_cadence(round_to_u8(cadence));
        }
        if let Some(hr) = self.aggregator.drain_average(SampleChannel::HeartRate, true).await {
            record.set_heartrate(round_to_u8(hr));
        }

        record
    }

    /// Path of the session log, derived once per session.
    fn session_path(&mut self, fs: &dyn Filesystem, first_timestamp: u32) -> Result<PathBuf> {
        if let Some(log) = &self.log_path {
            return Ok(log.clone());
        }

        let log = self.paths.derive(fs, first_timestamp).map_err(|e| {
            warn!("No session path this period: {}", e);
            e
        })?;
        self.log_path = Some(log.clone());
        Ok(log)
    }

    /// Write out the buffer; stats are saved best-effort after a flush.
    fn flush(&mut self, fs: &dyn Filesystem) -> Result<usize> {
        let Some(first_timestamp) = self.buffer.first_timestamp() else {
            return Ok(0);
        };

        let log = self.session_path(fs, first_timestamp)?;
        let flushed = self.buffer.flush(fs, &log)?;

        if let Err(e) = self.stats.save(fs, &self.paths.stats_path(&log)) {
            warn!("Stats not saved after flush: {}", e);
        }
        Ok(flushed)
    }

    fn save_stats(&self, fs: &dyn Filesystem) -> Result<()> {
        match &self.log_path {
            Some(log) => self.stats.save(fs, &self.paths.stats_path(log)),
            None => Ok(()),
        }
    }
}

fn round_to_u16(value: f64) -> u16 {
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

fn round_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, f64::from(u8::MAX)) as u8
}
