//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{RecorderError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where session files live
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    #[serde(default = "default_continuation_file")]
    pub continuation_file: String,

    #[serde(default = "default_stats_extension")]
    pub stats_extension: String,
}

/// Sampling and buffering
#[derive(Debug, Deserialize, Clone)]
pub struct RecorderConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Statistics accounting
#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_distance_notify_threshold_m")]
    pub distance_notify_threshold_m: f64,
}

/// Track export
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_on_end")]
    pub export_on_end: bool,

    #[serde(default = "default_creator")]
    pub creator: String,
}

/// Log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

// Default value functions
fn default_base_dir() -> String { "./rides".to_string() }
fn default_continuation_file() -> String { "last".to_string() }
fn default_stats_extension() -> String { ".stx".to_string() }

fn default_buffer_capacity() -> usize { 60 }
fn default_tick_interval_ms() -> u64 { 1000 }
fn default_sample_capacity() -> usize { 16 }
fn default_lock_timeout_ms() -> u64 { 100 }

fn default_distance_notify_threshold_m() -> f64 { 0.01 }

fn default_export_on_end() -> bool { true }
fn default_creator() -> String { "ride-recorder".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            continuation_file: default_continuation_file(),
            stats_extension: default_stats_extension(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
            sample_capacity: default_sample_capacity(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            distance_notify_threshold_m: default_distance_notify_threshold_m(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_on_end: default_export_on_end(),
            creator: default_creator(),
        }
    }
}

impl RecorderConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn invalid(msg: impl std::fmt::Display) -> RecorderError {
    RecorderError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ride_recorder::config::Config;
    ///
    /// let config = Config::load("config/recorder.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.storage.base_dir.is_empty() {
            return Err(invalid("storage base_dir cannot be empty"));
        }

        let continuation = &self.storage.continuation_file;
        if continuation.is_empty() || continuation.contains('/') || continuation.contains('\\') {
            return Err(invalid("continuation_file must be a bare file name"));
        }

        if self.storage.stats_extension.is_empty() {
            return Err(invalid("stats_extension cannot be empty"));
        }

        // The track extension is reserved for exports
        if self.storage.stats_extension == ".gpx" {
            return Err(invalid("stats_extension cannot be .gpx"));
        }

        if self.recorder.buffer_capacity == 0 || self.recorder.buffer_capacity > 3600 {
            return Err(invalid("buffer_capacity must be between 1 and 3600"));
        }

        if self.recorder.tick_interval_ms < 100 || self.recorder.tick_interval_ms > 60000 {
            return Err(invalid("tick_interval_ms must be between 100 and 60000"));
        }

        if self.recorder.sample_capacity == 0 || self.recorder.sample_capacity > 1024 {
            return Err(invalid("sample_capacity must be between 1 and 1024"));
        }

        if self.recorder.lock_timeout_ms == 0 || self.recorder.lock_timeout_ms > 5000 {
            return Err(invalid("lock_timeout_ms must be between 1 and 5000"));
        }

        // A lock wait longer than the tick would let ticks pile up
        if self.recorder.lock_timeout_ms >= self.recorder.tick_interval_ms {
            return Err(invalid("lock_timeout_ms must be shorter than tick_interval_ms"));
        }

        let threshold = self.stats.distance_notify_threshold_m;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(invalid("distance_notify_threshold_m must be a non-negative number"));
        }

        if self.export.creator.trim().is_empty() {
            return Err(invalid("export creator cannot be empty"));
        }

        if let Some(dir) = &self.logging.file_dir {
            if dir.is_empty() {
                return Err(invalid("logging file_dir cannot be empty when set"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[storage]
base_dir = "/mnt/sd/rides"

[recorder]
buffer_capacity = 30
tick_interval_ms = 2000

[stats]

[export]
export_on_end = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.storage.base_dir, "/mnt/sd/rides");
        assert_eq!(config.storage.continuation_file, "last");
        assert_eq!(config.recorder.buffer_capacity, 30);
        assert_eq!(config.recorder.tick_interval(), Duration::from_secs(2));
        assert_eq!(config.recorder.sample_capacity, 16);
        assert!(!config.export.export_on_end);
        assert!(config.logging.file_dir.is_none());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/recorder.toml");
        let config = Config::load(path).unwrap();
        let defaults = Config::default();

        assert_eq!(config.storage.base_dir, defaults.storage.base_dir);
        assert_eq!(config.storage.stats_extension, defaults.storage.stats_extension);
        assert_eq!(config.recorder.buffer_capacity, defaults.recorder.buffer_capacity);
        assert_eq!(config.recorder.tick_interval_ms, defaults.recorder.tick_interval_ms);
        assert_eq!(config.recorder.lock_timeout_ms, defaults.recorder.lock_timeout_ms);
        assert_eq!(config.export.creator, defaults.export.creator);
        assert!(config.logging.file_dir.is_none());
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.recorder.buffer_capacity, 60);
        assert_eq!(config.recorder.lock_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[recorder]\nbuffer_capacity = 0\n").unwrap();
        temp_file.flush().unwrap();

        match Config::load(temp_file.path()) {
            Err(RecorderError::Config(e)) => assert!(e.to_string().contains("buffer_capacity")),
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/ride-recorder.toml"),
            Err(RecorderError::Io(_))
        ));
    }

    #[test]
    fn test_load_malformed_toml() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[recorder\nbuffer_capacity = ").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(Config::load(temp_file.path()), Err(RecorderError::Config(_))));
    }

    #[test]
    fn test_empty_base_dir() {
        let mut config = Config::default();
        config.storage.base_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_continuation_file_must_be_bare_name() {
        let mut config = Config::default();
        config.storage.continuation_file = "sub/last".to_string();
        assert!(config.validate().is_err());

        config.storage.continuation_file = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stats_extension() {
        let mut config = Config::default();
        config.storage.stats_extension = String::new();
        assert!(config.validate().is_err());

        config.storage.stats_extension = ".gpx".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_capacity_too_high() {
        let mut config = Config::default();
        config.recorder.buffer_capacity = 3601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_interval_bounds() {
        let mut config = Config::default();
        config.recorder.tick_interval_ms = 99;
        assert!(config.validate().is_err());

        config.recorder.tick_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_capacity_bounds() {
        let mut config = Config::default();
        config.recorder.sample_capacity = 0;
        assert!(config.validate().is_err());

        config.recorder.sample_capacity = 1025;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_timeout_bounds() {
        let mut config = Config::default();
        config.recorder.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.recorder.lock_timeout_ms = 5001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_timeout_must_fit_in_tick() {
        let mut config = Config::default();
        config.recorder.tick_interval_ms = 500;
        config.recorder.lock_timeout_ms = 500;
        assert!(config.validate().is_err());

        config.recorder.lock_timeout_ms = 499;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_notify_threshold() {
        let mut config = Config::default();
        config.stats.distance_notify_threshold_m = -0.1;
        assert!(config.validate().is_err());

        config.stats.distance_notify_threshold_m = f64::NAN;
        assert!(config.validate().is_err());

        config.stats.distance_notify_threshold_m = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_creator() {
        let mut config = Config::default();
        config.export.creator = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_set() {
        let mut config = Config::default();
        config.logging.file_dir = Some(String::new());
        assert!(config.validate().is_err());

        config.logging.file_dir = Some("/var/log/ride-recorder".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_base_dir(), "./rides");
        assert_eq!(default_continuation_file(), "last");
        assert_eq!(default_stats_extension(), ".stx");
        assert_eq!(default_buffer_capacity(), 60);
        assert_eq!(default_tick_interval_ms(), 1000);
        assert_eq!(default_sample_capacity(), 16);
        assert_eq!(default_lock_timeout_ms(), 100);
        assert_eq!(default_distance_notify_threshold_m(), 0.01);
        assert_eq!(default_export_on_end(), true);
        assert_eq!(default_creator(), "ride-recorder");
    }
}
