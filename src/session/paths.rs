//! # Session Paths
//!
//! Naming of session logs and their companion files, and the continuation
//! pointer that lets an interrupted session be picked up after a restart.
//!
//! ```text
//! <base>/last            continuation pointer (raw path bytes)
//! <base>/MMDDhhmm        session log
//! <base>/MMDDhhmm.stx    stats side-file
//! <base>/MMDDhhmm.gpx    exported track
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{RecorderError, Result};
use crate::record::decoder::is_whole_records;
use crate::storage::Filesystem;

/// Characters tried, in order, when a file name is already taken
pub const SUFFIX_POOL: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// Extension of exported tracks
pub const TRACK_EXTENSION: &str = ".gpx";

/// Append a raw suffix to a path's final component (`a/b` + `.x` = `a/b.x`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Log file name for a session whose first record was taken at `timestamp`
///
/// # Returns
///
/// * `Option<String>` - `MMDDhhmm` in UTC, or `None` for an unset timestamp
///
/// # Examples
///
/// ```
/// use ride_recorder::session::paths::log_name;
///
/// // 2023-11-14T22:13:20Z
/// assert_eq!(log_name(1_700_000_000).as_deref(), Some("11142213"));
/// assert_eq!(log_name(0), None);
/// ```
pub fn log_name(timestamp: u32) -> Option<String> {
    if timestamp == 0 {
        return None;
    }
    let time = DateTime::from_timestamp(i64::from(timestamp), 0)?;
    Some(time.format("%m%d%H%M").to_string())
}

/// Check that a log can be appended to without damaging it
///
/// # Errors
///
/// Returns `NotResumable` if the file is missing, cannot be opened for
/// appending, or its length is not a whole number of records.
pub fn check_resumable(fs: &dyn Filesystem, log: &Path) -> Result<()> {
    if !fs.exists(log) {
        debug!("Log {} does not exist", log.display());
        return Err(RecorderError::NotResumable(log.to_path_buf()));
    }

    let size = fs.size(log).map_err(|e| {
        warn!("Cannot stat {}: {}", log.display(), e);
        RecorderError::NotResumable(log.to_path_buf())
    })?;
    if !is_whole_records(size) {
        warn!("Log {} is {} bytes, not a whole number of records", log.display(), size);
        return Err(RecorderError::NotResumable(log.to_path_buf()));
    }

    fs.append(log, &[]).map_err(|e| {
        warn!("Log {} is not appendable: {}", log.display(), e);
        RecorderError::NotResumable(log.to_path_buf())
    })?;

    Ok(())
}

/// Session file layout under one base directory
#[derive(Debug, Clone)]
pub struct SessionPaths {
    base_dir: PathBuf,
    continuation: PathBuf,
    stats_extension: String,
}

impl SessionPaths {
    pub fn new(base_dir: impl Into<PathBuf>, continuation_file: &str, stats_extension: &str) -> Self {
        let base_dir = base_dir.into();
        Self {
            continuation: base_dir.join(continuation_file),
            base_dir,
            stats_extension: stats_extension.to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            &config.base_dir,
            &config.continuation_file,
            &config.stats_extension,
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn continuation_path(&self) -> &Path {
        &self.continuation
    }

    /// Stats side-file belonging to `log`
    pub fn stats_path(&self, log: &Path) -> PathBuf {
        with_suffix(log, &self.stats_extension)
    }

    /// Log named by the continuation pointer, if it can be resumed
    ///
    /// Any failure (missing pointer, unreadable pointer, damaged log) yields
    /// `None`; the caller then starts a fresh log.
    pub fn resume_target(&self, fs: &dyn Filesystem) -> Option<PathBuf> {
        if !fs.exists(&self.continuation) {
            return None;
        }

        let bytes = match fs.read(&self.continuation) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read continuation pointer: {}", e);
                return None;
            }
        };

        let target = match String::from_utf8(bytes) {
            Ok(s) if !s.is_empty() => PathBuf::from(s),
            _ => {
                warn!("Continuation pointer {} is malformed", self.continuation.display());
                return None;
            }
        };

        match check_resumable(fs, &target) {
            Ok(()) => {
                info!("Resuming session log {}", target.display());
                Some(target)
            }
            Err(_) => None,
        }
    }

    /// Point the continuation file at `log`.
    pub fn write_continuation(&self, fs: &dyn Filesystem, log: &Path) -> Result<()> {
        fs.write(&self.continuation, log.to_string_lossy().as_bytes())?;
        debug!("Continuation pointer set to {}", log.display());
        Ok(())
    }

    /// Remove the continuation pointer; a missing pointer is not an error.
    pub fn clear_continuation(&self, fs: &dyn Filesystem) -> Result<()> {
        if fs.exists(&self.continuation) {
            fs.remove(&self.continuation)?;
            debug!("Continuation pointer removed");
        }
        Ok(())
    }

    /// Find the log for a session whose first record has `first_timestamp`
    ///
    /// Resumes the log named by the continuation pointer when it is intact,
    /// otherwise names a new log after the session time and points the
    /// continuation file at it.
    ///
    /// # Errors
    ///
    /// Returns `PathUnavailable` on any filesystem failure, and
    /// `MissingTimestamp` when a new log must be named but there is no time.
    pub fn derive(&self, fs: &dyn Filesystem, first_timestamp: u32) -> Result<PathBuf> {
        if !fs.exists(&self.base_dir) {
            fs.mkdir(&self.base_dir).map_err(|e| {
                RecorderError::PathUnavailable(format!(
                    "cannot create {}: {}",
                    self.base_dir.display(),
                    e
                ))
            })?;
            info!("Created recording directory {}", self.base_dir.display());
        }

        if let Some(resumed) = self.resume_target(fs) {
            return Ok(resumed);
        }

        let name = log_name(first_timestamp).ok_or(RecorderError::MissingTimestamp)?;
        let log = self.free_log_path(fs, &name)?;

        self.write_continuation(fs, &log).map_err(|e| {
            RecorderError::PathUnavailable(format!("cannot write continuation pointer: {}", e))
        })?;

        info!("Starting new session log {}", log.display());
        Ok(log)
    }

    fn free_log_path(&self, fs: &dyn Filesystem, name: &str) -> Result<PathBuf> {
        let preferred = self.base_dir.join(name);
        if !fs.exists(&preferred) {
            return Ok(preferred);
        }

        warn!("{} already exists, probing suffixes", preferred.display());
        SUFFIX_POOL
            .chars()
            .map(|c| self.base_dir.join(format!("{}{}", name, c)))
            .find(|candidate| !fs.exists(candidate))
            .ok_or_else(|| RecorderError::PathUnavailable(format!("every name for {} is taken", name)))
    }
}
