//! # Sample and Result Types
//!
//! Core data types flowing through the Pulse pipeline: the immutable metric
//! sample produced at ingestion, and the analysis result projected from the
//! current window.
//!
//! ## Design Principles
//!
//! 1. **Immutable Samples**: A `MetricSample` is built once at the boundary and
//!    only moved afterwards (producer -> queue -> window). Fields are private
//!    so nothing downstream can patch a sample in place.
//!
//! 2. **Projection, Not State**: `AnalysisResult` is always recomputed from a
//!    window snapshot and never updated incrementally, so it is internally
//!    consistent with exactly one window state.
//!
//! 3. **Wall-Clock Timestamps**: Samples carry UTC `DateTime`s because they
//!    are reported by remote hosts; arrival order, not timestamp order, drives
//!    the window.
//!
//! ## Wire Shapes
//!
//! ```text
//! MetricSample (persisted record):
//! {"timestamp":"2024-05-01T12:00:00Z","cpu":41.5,"rps":1200.0}
//!
//! AnalysisResult (GET /stats):
//! {"count":50,"avg_cpu":40.1,"avg_rps":1180.2,
//!  "last_timestamp":"2024-05-01T12:00:00Z","last_rps":1200.0,
//!  "is_anomaly_rps":false,"zscore_rps":0.41,"window_size_used":50}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

/// A single host/service measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    timestamp: DateTime<Utc>,
    cpu: f64,
    rps: f64,
}

impl MetricSample {
    /// Creates a sample with an explicit timestamp.
    pub fn new(timestamp: DateTime<Utc>, cpu: f64, rps: f64) -> Self {
        MetricSample { timestamp, cpu, rps }
    }

    /// Creates a sample stamped with the current time.
    pub fn now(cpu: f64, rps: f64) -> Self {
        Self::new(Utc::now(), cpu, rps)
    }

    /// Creates a sample from an epoch-millisecond timestamp.
    ///
    /// `0` means "not provided" and is replaced by the current time.
    ///
    /// # Errors
    /// Returns `PulseError::Malformed` if the timestamp is outside the range
    /// representable by `DateTime<Utc>`.
    pub fn from_epoch_millis(millis: i64, cpu: f64, rps: f64) -> PulseResult<Self> {
        if millis == 0 {
            return Ok(Self::now(cpu, rps));
        }
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| PulseError::Malformed("timestamp out of range".to_string()))?;
        Ok(Self::new(timestamp, cpu, rps))
    }

    /// Returns the reported timestamp.
    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns CPU utilization.
    #[inline]
    pub fn cpu(&self) -> f64 {
        self.cpu
    }

    /// Returns requests per second.
    #[inline]
    pub fn rps(&self) -> f64 {
        self.rps
    }

    /// Encodes the sample as the JSON record written to the persistence store.
    pub fn to_record(&self) -> PulseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Rolling statistics over the current window.
///
/// An empty window yields `AnalysisResult::default()`: zero counts, zero
/// means, no last timestamp, and no anomaly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Number of samples in the window.
    pub count: usize,
    /// Population mean of CPU utilization.
    pub avg_cpu: f64,
    /// Population mean of requests per second.
    pub avg_rps: f64,
    /// Timestamp of the most recently inserted sample.
    pub last_timestamp: Option<DateTime<Utc>>,
    /// RPS of the most recently inserted sample.
    pub last_rps: f64,
    /// True when `|zscore_rps|` exceeds the anomaly threshold.
    pub is_anomaly_rps: bool,
    /// Z-score of the latest RPS against the window (0 when variance is 0).
    pub zscore_rps: f64,
    /// Number of samples the statistics were computed over.
    pub window_size_used: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_millis_conversion() {
        let sample = MetricSample::from_epoch_millis(1_714_564_800_123, 10.0, 20.0).unwrap();
        assert_eq!(sample.timestamp().timestamp_millis(), 1_714_564_800_123);
        assert_eq!(sample.cpu(), 10.0);
        assert_eq!(sample.rps(), 20.0);
    }

    #[test]
    fn test_zero_timestamp_uses_now() {
        let before = Utc::now();
        let sample = MetricSample::from_epoch_millis(0, 1.0, 2.0).unwrap();
        let after = Utc::now();
        assert!(sample.timestamp() >= before && sample.timestamp() <= after);
    }

    #[test]
    fn test_out_of_range_timestamp_is_malformed() {
        let err = MetricSample::from_epoch_millis(i64::MAX, 1.0, 2.0).unwrap_err();
        assert!(matches!(err, PulseError::Malformed(_)));
    }

    #[test]
    fn test_record_shape() {
        let sample = MetricSample::from_epoch_millis(1_000, 12.5, 300.0).unwrap();
        let record: serde_json::Value = serde_json::from_slice(&sample.to_record().unwrap()).unwrap();
        assert_eq!(record["timestamp"], "1970-01-01T00:00:01Z");
        assert_eq!(record["cpu"], 12.5);
        assert_eq!(record["rps"], 300.0);
    }

    #[test]
    fn test_empty_result() {
        let result = AnalysisResult::default();
        assert_eq!(result.count, 0);
        assert!(!result.is_anomaly_rps);
        assert!(result.last_timestamp.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], 0);
        assert!(json["last_timestamp"].is_null());
    }
}
