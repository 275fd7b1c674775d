//! # Error Taxonomy
//!
//! Errors that can cross the ingestion boundary. The analyzer itself is total,
//! so everything here describes why a sample never reached the window.

use thiserror::Error;

/// Result alias used across the Pulse crates.
pub type PulseResult<T> = Result<T, PulseError>;

/// Admission and decoding failures reported synchronously to producers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PulseError {
    /// Payload could not be decoded into a metric sample.
    #[error("invalid JSON: {0}")]
    Malformed(String),
    /// Ingest queue is at capacity; the caller should retry later.
    #[error("ingest queue full")]
    QueueFull,
    /// Queue has been closed for shutdown and accepts no new samples.
    #[error("service shutting down")]
    ShuttingDown,
}

impl PulseError {
    /// Returns true for admission failures (as opposed to bad input).
    ///
    /// Both overload and shutdown tell the caller to come back later.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PulseError::QueueFull | PulseError::ShuttingDown)
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Malformed(err.to_string())
    }
}
