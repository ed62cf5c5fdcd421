//! # Record Buffer
//!
//! Fixed-capacity in-memory staging area for records between flushes.
//!
//! Records are appended one per tick and written to the session log in a
//! single append once the buffer fills. A flush only rewinds the write
//! index; old slots are left in place and overwritten on reuse.

use std::path::Path;

use tracing::{debug, warn};

use super::fs_trait::Filesystem;
use crate::error::{RecorderError, Result};
use crate::record::encoder::encode_records;
use crate::record::Record;

/// Fixed-size array of records with a write index
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    slots: Vec<Record>,
    len: usize,
}

impl RecordBuffer {
    /// Create a buffer holding up to `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Record::default(); capacity.max(1)],
            len: 0,
        }
    }

    /// Append a record
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - `true` when the buffer is now full and must be
    ///   flushed before the next append
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The buffer is already full
    /// - The record would open a batch but carries no timestamp
    pub fn append(&mut self, record: Record) -> Result<bool> {
        if self.is_full() {
            return Err(RecorderError::BufferFull(self.len));
        }
        if self.len == 0 && record.timestamp == 0 {
            return Err(RecorderError::MissingTimestamp);
        }

        self.slots[self.len] = record;
        self.len += 1;
        Ok(self.is_full())
    }

    /// Write every buffered record to `path` in one append
    ///
    /// The buffer is only rewound when the whole batch was accepted, so a
    /// failed flush is retried with the same records.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of records written
    pub fn flush(&mut self, fs: &dyn Filesystem, path: &Path) -> Result<usize> {
        if self.len == 0 {
            return Ok(0);
        }

        let bytes = encode_records(self.records());
        let written = fs.append(path, &bytes).map_err(|e| {
            warn!("Flush of {} records to {} failed: {}", self.len, path.display(), e);
            RecorderError::Io(e)
        })?;

        if written != bytes.len() {
            warn!(
                "Short flush to {}: {} of {} bytes",
                path.display(),
                written,
                bytes.len()
            );
            return Err(RecorderError::ShortWrite {
                path: path.to_path_buf(),
                written,
                expected: bytes.len(),
            });
        }

        let flushed = self.len;
        self.len = 0;
        debug!("Flushed {} records to {}", flushed, path.display());
        Ok(flushed)
    }

    /// Buffered records in append order
    pub fn records(&self) -> &[Record] {
        &self.slots[..self.len]
    }

    /// Timestamp of the first buffered record
    pub fn first_timestamp(&self) -> Option<u32> {
        self.records().first().map(|r| r.timestamp)
    }

    /// Drop buffered records without writing them.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
