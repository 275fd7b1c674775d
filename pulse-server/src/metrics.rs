//! # Service Metrics
//!
//! Counters for the analysis pipeline and per-route HTTP traffic, exported in
//! Prometheus text format at `GET /metrics`.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Counters are lock-free atomics inside the
//!    prometheus collectors; recording never allocates on the hot path.
//! 2. **Injected, Not Global**: The registry is owned by `Metrics`, which is
//!    handed to the dispatcher as a `CounterSink`, so tests can build their own.
//! 3. **Bounded Labels**: HTTP series are labelled with the matched route
//!    template, never the raw URI.
//!
//! ## Exported Series
//! - `metrics_processed_total`: samples consumed by the analyzer.
//! - `anomalies_total`: samples flagged as RPS anomalies.
//! - `http_requests_total{method,path}`
//! - `http_request_duration_seconds{method,path}` (histogram)

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::sink::CounterSink;

/// Point-in-time values of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Samples consumed by the analyzer.
    pub processed_total: u64,
    /// Samples flagged as anomalies.
    pub anomalies_total: u64,
}

/// Prometheus-backed metrics for the service.
pub struct Metrics {
    registry: Registry,
    processed: IntCounter,
    anomalies: IntCounter,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
}

impl Metrics {
    /// Creates the collectors and registers them in a private registry.
    ///
    /// # Errors
    /// Returns a prometheus error if a collector fails to register.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let processed = IntCounter::new(
            "metrics_processed_total",
            "Total number of processed metrics",
        )?;
        let anomalies = IntCounter::new(
            "anomalies_total",
            "Total number of detected anomalies (RPS)",
        )?;
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "path"],
        )?;

        registry.register(Box::new(processed.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;

        Ok(Metrics {
            registry,
            processed,
            anomalies,
            http_requests,
            http_duration,
        })
    }

    /// Records one served HTTP request.
    pub fn record_http(&self, method: &str, path: &str, latency: Duration) {
        self.http_requests.with_label_values(&[method, path]).inc();
        self.http_duration
            .with_label_values(&[method, path])
            .observe(latency.as_secs_f64());
    }

    /// Returns the pipeline counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_total: self.processed.get(),
            anomalies_total: self.anomalies.get(),
        }
    }

    /// Renders every registered series in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

impl CounterSink for Metrics {
    fn record_processed(&self) {
        self.processed.inc();
    }

    fn record_anomaly(&self) {
        self.anomalies.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                processed_total: 0,
                anomalies_total: 0
            }
        );
    }

    #[test]
    fn counter_sink_increments() {
        let metrics = Metrics::new().unwrap();
        metrics.record_processed();
        metrics.record_processed();
        metrics.record_anomaly();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed_total, 2);
        assert_eq!(snapshot.anomalies_total, 1);
    }

    #[test]
    fn render_includes_all_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record_processed();
        metrics.record_http("POST", "/ingest", Duration::from_millis(3));

        let text = metrics.render().unwrap();
        assert!(text.contains("metrics_processed_total 1"));
        assert!(text.contains("anomalies_total 0"));
        assert!(text.contains(r#"http_requests_total{method="POST",path="/ingest"} 1"#));
        assert!(text.contains("http_request_duration_seconds_bucket"));
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_anomaly();
        assert_eq!(second.snapshot().anomalies_total, 0);
    }
}
