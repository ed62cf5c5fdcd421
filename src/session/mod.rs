//! # Session Module
//!
//! The recording session engine.
//!
//! This module handles:
//! - The start / pause / end lifecycle and the per-period tick
//! - Naming session logs and resuming them after an unclean restart
//! - Distance and altitude-gain accounting
//! - Driving the tick from a fixed-period timer

pub mod paths;
pub mod recorder;
pub mod scheduler;
pub mod stats;

pub use recorder::{EndSummary, Recorder, SessionState, SessionStatus, SkipReason, TickOutcome};
pub use stats::{SessionStats, StatsAccumulator};
