//! # Ride Recorder Library
//!
//! Telemetry recording engine for a cycling computer.
//!
//! This library turns asynchronously arriving sensor samples (power, cadence,
//! heart rate, GPS) into a durable, resumable, append-only session log, and
//! converts finished logs into GPX tracks for upload.

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod export;
pub mod position;
pub mod record;
pub mod sensors;
pub mod session;
pub mod storage;
