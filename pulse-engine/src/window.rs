//! # Sample Window
//!
//! Fixed-capacity FIFO buffer holding the most recent metric samples in
//! arrival order.
//!
//! ## Design Principles
//!
//! 1. **Bounded Memory**: Storage is allocated once at construction and never
//!    grows past `capacity`.
//! 2. **Overwrite-Oldest**: Appending at capacity evicts exactly one sample,
//!    the oldest, before the new one lands.
//! 3. **Infallible**: No operation can fail; bad capacities are normalized.
//!
//! ```text
//! capacity = 4
//!   append s1..s4  ->  [s1, s2, s3, s4]
//!   append s5      ->  [s2, s3, s4, s5]   (s1 evicted)
//! ```

use std::collections::vec_deque::{self, VecDeque};

use pulse_common::MetricSample;

/// Capacity used when the caller asks for an empty window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

/// Bounded, arrival-ordered sample buffer.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl SampleWindow {
    /// Creates an empty window.
    ///
    /// A capacity of zero is replaced by `DEFAULT_WINDOW_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = normalize_capacity(capacity);
        SampleWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one when full.
    ///
    /// Returns the evicted sample, if any.
    pub fn append(&mut self, sample: MetricSample) -> Option<MetricSample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Returns the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        self.samples.iter().copied().collect()
    }

    /// Iterates over the current contents, oldest first, without copying.
    pub fn iter(&self) -> vec_deque::Iter<'_, MetricSample> {
        self.samples.iter()
    }

    /// Returns the number of retained samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true when no samples are retained.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

fn normalize_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        DEFAULT_WINDOW_CAPACITY
    } else {
        capacity
    }
}
