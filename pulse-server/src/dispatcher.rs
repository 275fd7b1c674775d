//! # Ingestion Dispatcher
//!
//! Bounded hand-off between request handlers (many producers) and the single
//! consumer task that feeds the analyzer.
//!
//! ## Design Principles
//! 1. **Drop, Don't Block**: `try_submit` never waits. A full queue is an
//!    immediate `QueueFull` so the boundary can answer "try later".
//! 2. **Single Consumer**: Exactly one task owns the receiver, so window
//!    mutations are applied strictly in dequeue order.
//! 3. **Injected Sinks**: Counters and persistence are trait objects passed
//!    in at construction; nothing here touches process-wide state.
//! 4. **Drain on Shutdown**: When the shutdown future resolves the queue is
//!    closed to new samples and everything already admitted is analyzed
//!    before the task exits.
//!
//! ```text
//! handler ─┐
//! handler ─┼─ try_submit ─> [ bounded mpsc ] ─> Dispatcher::run ─> Analyzer::insert
//! handler ─┘                                         ├─> CounterSink
//!                                                    ├─> warn! on anomaly
//!                                                    └─> SampleSink (fire-and-forget)
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::SecondsFormat;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulse_common::{AnalysisResult, MetricSample, PulseError, PulseResult};
use pulse_engine::Analyzer;

use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::sink::{CounterSink, SampleSink};

/// Producer side of the ingest queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<MetricSample>,
}

impl IngestHandle {
    /// Attempts to enqueue a sample without waiting.
    ///
    /// # Errors
    /// - `PulseError::QueueFull` when the queue is at capacity.
    /// - `PulseError::ShuttingDown` when the consumer has closed the queue.
    pub fn try_submit(&self, sample: MetricSample) -> PulseResult<()> {
        match self.tx.try_send(sample) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PulseError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(PulseError::ShuttingDown),
        }
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Samples admitted but not yet consumed.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side of the ingest queue.
pub struct Dispatcher {
    rx: mpsc::Receiver<MetricSample>,
    analyzer: Arc<Analyzer>,
    counters: Arc<dyn CounterSink>,
    store: Arc<dyn SampleSink>,
}

impl Dispatcher {
    /// Creates the queue and its consumer.
    ///
    /// A zero capacity falls back to `DEFAULT_QUEUE_CAPACITY`. The consumer
    /// does nothing until `run` (or `spawn`) is called, so samples submitted
    /// before then simply wait in the queue.
    pub fn new(
        queue_capacity: usize,
        analyzer: Arc<Analyzer>,
        counters: Arc<dyn CounterSink>,
        store: Arc<dyn SampleSink>,
    ) -> (IngestHandle, Dispatcher) {
        let capacity = if queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            queue_capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        let dispatcher = Dispatcher {
            rx,
            analyzer,
            counters,
            store,
        };
        (IngestHandle { tx }, dispatcher)
    }

    /// Consumes samples until `shutdown` resolves or every producer is gone,
    /// then drains what was already admitted.
    ///
    /// Returns the number of samples processed.
    pub async fn run<F>(mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut processed = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                next = self.rx.recv() => match next {
                    Some(sample) => {
                        self.process(sample);
                        processed += 1;
                    }
                    None => {
                        debug!("all ingest producers dropped");
                        return processed;
                    }
                },
            }
        }

        self.rx.close();
        let mut drained = 0u64;
        while let Some(sample) = self.rx.recv().await {
            self.process(sample);
            drained += 1;
        }
        info!(processed, drained, "ingest queue drained");
        processed + drained
    }

    /// Runs the consumer on the current runtime.
    pub fn spawn<F>(self, shutdown: F) -> JoinHandle<u64>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(shutdown))
    }

    fn process(&self, sample: MetricSample) -> AnalysisResult {
        let result = self.analyzer.insert(sample);
        self.counters.record_processed();

        if result.is_anomaly_rps {
            self.counters.record_anomaly();
            let ts = result
                .last_timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            warn!(
                "[ANOMALY] ts={} rps={:.2} z={:.2} avg_rps={:.2}",
                ts, result.last_rps, result.zscore_rps, result.avg_rps
            );
        }

        self.store.persist(&sample);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingSink {
        processed: AtomicU64,
        anomalies: AtomicU64,
    }

    impl CounterSink for CountingSink {
        fn record_processed(&self) {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        fn record_anomaly(&self) {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        samples: Mutex<Vec<MetricSample>>,
    }

    impl SampleSink for RecordingStore {
        fn persist(&self, sample: &MetricSample) {
            self.samples.lock().push(*sample);
        }
    }

    struct Harness {
        analyzer: Arc<Analyzer>,
        counters: Arc<CountingSink>,
        store: Arc<RecordingStore>,
    }

    fn setup(queue: usize, window: usize) -> (IngestHandle, Dispatcher, Harness) {
        let analyzer = Arc::new(Analyzer::new(window));
        let counters = Arc::new(CountingSink::default());
        let store = Arc::new(RecordingStore::default());
        let (handle, dispatcher) = Dispatcher::new(
            queue,
            Arc::clone(&analyzer),
            counters.clone(),
            store.clone(),
        );
        (
            handle,
            dispatcher,
            Harness {
                analyzer,
                counters,
                store,
            },
        )
    }

    fn sample(rps: f64) -> MetricSample {
        MetricSample::from_epoch_millis(1_700_000_000_000, 10.0, rps).unwrap()
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let (handle, _dispatcher, _) = setup(0, 10);
        assert_eq!(handle.capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn rejects_when_full_and_consumer_paused() {
        let (handle, dispatcher, harness) = setup(3, 10);

        for rps in [1.0, 2.0, 3.0] {
            handle.try_submit(sample(rps)).unwrap();
        }
        assert_eq!(handle.pending(), 3);
        assert_eq!(handle.try_submit(sample(4.0)), Err(PulseError::QueueFull));
        assert_eq!(handle.try_submit(sample(5.0)), Err(PulseError::QueueFull));

        // Shutting down immediately still drains the admitted samples.
        let processed = dispatcher.run(async {}).await;
        assert_eq!(processed, 3);
        assert_eq!(harness.analyzer.len(), 3);
        let retained: Vec<f64> = harness.analyzer.snapshot().iter().map(|s| s.rps()).collect();
        assert_eq!(retained, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_refused() {
        let (handle, dispatcher, _) = setup(4, 10);
        dispatcher.run(async {}).await;
        assert_eq!(handle.try_submit(sample(1.0)), Err(PulseError::ShuttingDown));
    }

    #[tokio::test]
    async fn fans_out_to_counters_and_store() {
        let (handle, dispatcher, harness) = setup(16, 50);
        for _ in 0..5 {
            handle.try_submit(sample(10.0)).unwrap();
        }
        handle.try_submit(sample(1000.0)).unwrap();
        drop(handle);

        let processed = dispatcher.run(std::future::pending()).await;
        assert_eq!(processed, 6);
        assert_eq!(harness.counters.processed.load(Ordering::Relaxed), 6);
        assert_eq!(harness.counters.anomalies.load(Ordering::Relaxed), 1);
        assert_eq!(harness.store.samples.lock().len(), 6);

        let result = harness.analyzer.current_result();
        assert_eq!(result.count, 6);
        assert_eq!(result.last_rps, 1000.0);
        assert!(result.is_anomaly_rps);
    }

    #[tokio::test]
    async fn concurrent_producers_are_all_applied() {
        let (handle, dispatcher, harness) = setup(1000, 200);
        let consumer = dispatcher.spawn(std::future::pending());

        let mut producers = Vec::new();
        for producer in 0..4 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                let mut accepted = 0usize;
                for idx in 0..50 {
                    if handle.try_submit(sample((producer * 100 + idx) as f64)).is_ok() {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let mut accepted = 0;
        for producer in producers {
            accepted += producer.await.unwrap();
        }
        drop(handle);

        let processed = consumer.await.unwrap();
        assert_eq!(accepted, 200);
        assert_eq!(processed, 200);
        assert_eq!(harness.analyzer.current_result().count, 200);
    }
}
