//! # Sensors Module
//!
//! Aggregation of asynchronously arriving sensor samples.
//!
//! This module handles:
//! - Fixed-capacity per-channel sample rings
//! - Lock-bounded pushes from sensor notification tasks
//! - Per-tick averaging for the recorder

pub mod ring;
pub mod aggregator;

pub use aggregator::{SampleAggregator, SampleChannel};
