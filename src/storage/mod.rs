//! # Storage Module
//!
//! Persistence of the session log on the device filesystem.
//!
//! This module handles:
//! - The `Filesystem` abstraction and its `std::fs` implementation
//! - Buffering records in memory between flushes
//! - Appending whole batches to the session log

pub mod fs_trait;
pub mod buffer;

pub use buffer::RecordBuffer;
pub use fs_trait::{Filesystem, StdFilesystem};
