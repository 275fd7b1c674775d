//! # Pulse Engine
//!
//! Sliding-window analysis core: a bounded sample window, a population
//! statistics pass over it, and the lock-guarded `Analyzer` that ties both
//! together.

mod analyzer;
mod stats;
mod window;

pub use analyzer::Analyzer;
pub use stats::{compute_stats, ANOMALY_ZSCORE_THRESHOLD};
pub use window::{SampleWindow, DEFAULT_WINDOW_CAPACITY};
