//! # Analyzer
//!
//! Owns the sample window and recomputes statistics behind a single
//! reader/writer lock.
//!
//! ## Design Principles
//!
//! 1. **Single Writer, Many Readers**: `insert` takes the write lock for the
//!    whole append + recompute so no reader observes a half-applied insert;
//!    `current_result` takes the read lock and may run alongside other reads.
//! 2. **No I/O Under Lock**: Critical sections are CPU-only and O(window).
//! 3. **Total API**: Neither operation can fail.
//!
//! ```text
//! Analyzer
//!   └── window: RwLock<SampleWindow>
//!         └── samples: VecDeque<MetricSample>  (oldest .. newest)
//! ```

use parking_lot::RwLock;

use pulse_common::{AnalysisResult, MetricSample};

use crate::stats::compute_stats;
use crate::window::{SampleWindow, DEFAULT_WINDOW_CAPACITY};

/// Thread-safe sliding-window analyzer.
#[derive(Debug)]
pub struct Analyzer {
    window: RwLock<SampleWindow>,
}

impl Analyzer {
    /// Creates an analyzer with an empty window of `capacity` samples.
    ///
    /// A capacity of zero falls back to the default of 50.
    pub fn new(capacity: usize) -> Self {
        Analyzer {
            window: RwLock::new(SampleWindow::new(capacity)),
        }
    }

    /// Appends a sample and returns statistics over the post-insert window.
    pub fn insert(&self, sample: MetricSample) -> AnalysisResult {
        let mut window = self.window.write();
        window.append(sample);
        compute_stats(window.iter())
    }

    /// Returns statistics over the current window without mutating it.
    pub fn current_result(&self) -> AnalysisResult {
        let window = self.window.read();
        compute_stats(window.iter())
    }

    /// Returns a copy of the retained samples, oldest first.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        self.window.read().snapshot()
    }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize {
        self.window.read().len()
    }

    /// Returns true when the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.read().is_empty()
    }

    /// Returns the fixed window capacity.
    pub fn capacity(&self) -> usize {
        self.window.read().capacity()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
