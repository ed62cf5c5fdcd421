//! # Record Module
//!
//! Fixed-size binary records that make up a session log.
//!
//! This module handles:
//! - Record layout and field flags
//! - Little-endian encoding for append-only storage
//! - Decoding and validation when a log is read back

pub mod format;
pub mod encoder;
pub mod decoder;

pub use format::{Record, RecordFlags, RECORD_SIZE};
