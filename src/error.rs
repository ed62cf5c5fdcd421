//! # Error Types
//!
//! Custom error types for the ride recorder using `thiserror`.

use std::path::PathBuf;

use thiserror::Error;

use crate::sensors::SampleChannel;

/// Main error type for the ride recorder
#[derive(Debug, Error)]
pub enum RecorderError {
    /// A collaborator required to record was never attached
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage accepted fewer bytes than requested
    #[error("Short write to {}: {written} of {expected} bytes", .path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    /// No log path could be derived for the current session
    #[error("Session log path unavailable: {0}")]
    PathUnavailable(String),

    /// A record could not be decoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The first record of a session carried no timestamp
    #[error("First record of a session has no timestamp")]
    MissingTimestamp,

    /// The record buffer must be flushed before more records fit
    #[error("Record buffer full ({0} records)")]
    BufferFull(usize),

    /// A log file cannot be continued
    #[error("Log {} cannot be resumed", .0.display())]
    NotResumable(PathBuf),

    /// Sample channel lock could not be acquired in time
    #[error("Timed out waiting for {0} samples lock")]
    LockTimeout(SampleChannel),

    /// Track document generation failed
    #[error("XML error: {0}")]
    Xml(String),

    /// The log contains no exportable points
    #[error("Log {} contains no exportable records", .0.display())]
    EmptyLog(PathBuf),

    /// Every candidate export name is already taken
    #[error("No free export name for {}", .0.display())]
    ExportNameExhausted(PathBuf),

    /// No session is active
    #[error("No session is recording")]
    NotRecording,
}

/// Result type alias for the ride recorder
pub type Result<T> = std::result::Result<T, RecorderError>;
