//! # Export Module
//!
//! Conversion of finished session logs into interchange formats.

pub mod gpx;

pub use gpx::GpxExporter;
