//! # Sample Ring
//!
//! Fixed-capacity ring of raw sensor samples. Once full, every push evicts
//! the oldest sample, so memory use never grows past the configured capacity.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of samples for one channel.
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: VecDeque<u16>,
    capacity: usize,
}

impl SampleRing {
    /// Creates an empty ring. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a sample, evicting the oldest one when full.
    ///
    /// Returns the evicted sample, if any.
    pub fn push(&mut self, value: u16) -> Option<u16> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(value);
        evicted
    }

    /// Arithmetic mean of the buffered samples.
    ///
    /// Accumulates `v / n` per sample instead of dividing a running sum,
    /// so the accumulator stays bounded by the largest sample.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let n = self.samples.len() as f64;
        Some(self.samples.iter().fold(0.0, |acc, &v| acc + f64::from(v) / n))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
