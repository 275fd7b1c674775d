//! # Pipeline Sinks
//!
//! Collaborators the dispatcher fans results out to after each analysis:
//! a counters sink and a persistence sink. Both are injected as trait objects
//! so the dispatcher can be exercised with in-memory doubles.
//!
//! ## Persistence Model
//!
//! `StoreSink` appends every raw sample to the `metrics` list of a
//! Redis-compatible store. Writes are fire-and-forget:
//!
//! ```text
//! consumer task ── persist() ──> spawn_blocking ── LPUSH (<= 500 ms) ──> store
//!        │                             │
//!        └── returns immediately       └── failure: logged, dropped
//! ```
//!
//! In-flight writes are capped; when the cap is reached the sample is dropped
//! rather than queued behind a slow store.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use pulse_client::{ClientConfig, StoreClient};
use pulse_common::MetricSample;

/// List key samples are appended to.
pub const STORE_LIST_KEY: &[u8] = b"metrics";

/// Maximum concurrent writes to the store.
const MAX_IN_FLIGHT_WRITES: usize = 4;

/// Receives pipeline counter increments.
pub trait CounterSink: Send + Sync {
    /// Called once per consumed sample.
    fn record_processed(&self);
    /// Called once per detected anomaly.
    fn record_anomaly(&self);
}

/// Receives raw samples after analysis.
///
/// Implementations must return promptly and must never fail the caller.
pub trait SampleSink: Send + Sync {
    fn persist(&self, sample: &MetricSample);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CounterSink for NullSink {
    fn record_processed(&self) {}
    fn record_anomaly(&self) {}
}

impl SampleSink for NullSink {
    fn persist(&self, _sample: &MetricSample) {}
}

/// Best-effort persistence into a Redis-compatible list.
pub struct StoreSink {
    client: Arc<StoreClient>,
    in_flight: Arc<AtomicUsize>,
    dropped: AtomicU64,
}

impl StoreSink {
    /// Builds a sink whose every write is bounded by `timeout`.
    ///
    /// No connection is opened here; see `probe_store` for the startup check.
    pub fn new(addr: &str, timeout: Duration) -> pulse_client::ClientResult<Self> {
        let config = ClientConfig::new(addr)
            .with_timeout(timeout)
            .with_max_connections(MAX_IN_FLIGHT_WRITES);
        Ok(StoreSink {
            client: Arc::new(StoreClient::with_config(config)?),
            in_flight: Arc::new(AtomicUsize::new(0)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Number of samples skipped because the write cap was reached or no
    /// runtime was available.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of writes currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    fn try_reserve(&self) -> Option<InFlightSlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < MAX_IN_FLIGHT_WRITES).then_some(current + 1)
            })
            .ok()
            .map(|_| InFlightSlot(Arc::clone(&self.in_flight)))
    }
}

/// One reserved write slot, released on drop even if the write panics.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SampleSink for StoreSink {
    fn persist(&self, sample: &MetricSample) {
        let record = match sample.to_record() {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "failed to encode sample for store");
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("no runtime available, skipping store write");
                return;
            }
        };

        let Some(slot) = self.try_reserve() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("store writes saturated, dropping sample");
            return;
        };

        let client = Arc::clone(&self.client);
        runtime.spawn_blocking(move || {
            let _slot = slot;
            match client.lpush(STORE_LIST_KEY, &record) {
                Ok(len) => debug!(list_len = len, "sample persisted"),
                Err(err) if err.is_timeout() => warn!(addr = client.addr(), "LPUSH timed out"),
                Err(err) => warn!(addr = client.addr(), error = %err, "LPUSH failed"),
            }
        });
    }
}

/// Checks store connectivity once at startup.
///
/// Never fails: the outcome is logged and returned so callers can report it.
pub async fn probe_store(addr: &str, timeout: Duration) -> bool {
    let addr = addr.to_string();
    let probe = tokio::task::spawn_blocking(move || {
        let config = ClientConfig::new(addr.clone())
            .with_timeout(timeout)
            .with_max_connections(1);
        let result = StoreClient::with_config(config).and_then(|client| client.ping(None));
        (addr, result)
    });

    match probe.await {
        Ok((addr, Ok(_))) => {
            info!(addr = %addr, "connected to store");
            true
        }
        Ok((addr, Err(err))) => {
            warn!(addr = %addr, error = %err, "store ping failed, continuing without it");
            false
        }
        Err(err) => {
            warn!(error = %err, "store probe task failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Accepts one connection and answers every LPUSH with `:1`, reporting
    /// the pushed key and value.
    fn spawn_list_store() -> (String, mpsc::Receiver<(Vec<u8>, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let count: usize = line[1..].trim_end().parse().unwrap();
                let mut args = Vec::new();
                for _ in 0..count {
                    line.clear();
                    reader.read_line(&mut line).unwrap();
                    let len: usize = line[1..].trim_end().parse().unwrap();
                    let mut data = vec![0u8; len + 2];
                    reader.read_exact(&mut data).unwrap();
                    data.truncate(len);
                    args.push(data);
                }
                stream.write_all(b":1\r\n").unwrap();
                let _ = tx.send((args[1].clone(), args[2].clone()));
            }
        });

        (addr, rx)
    }

    #[tokio::test]
    async fn store_sink_pushes_json_record() {
        let (addr, pushed) = spawn_list_store();
        let sink = StoreSink::new(&addr, Duration::from_secs(1)).unwrap();

        let sample = MetricSample::from_epoch_millis(1_000, 12.5, 300.0).unwrap();
        sink.persist(&sample);

        let (key, value) = tokio::task::spawn_blocking(move || pushed.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, STORE_LIST_KEY);
        let record: serde_json::Value = serde_json::from_slice(&value).unwrap();
        assert_eq!(record["rps"], 300.0);
        assert_eq!(record["cpu"], 12.5);
        assert_eq!(record["timestamp"], "1970-01-01T00:00:01Z");
    }

    #[tokio::test]
    async fn store_sink_swallows_unreachable_store() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let sink = StoreSink::new(&addr, Duration::from_millis(100)).unwrap();
        let sample = MetricSample::now(1.0, 2.0);

        // Returns immediately even though every write will fail.
        for _ in 0..32 {
            sink.persist(&sample);
        }
        assert!(sink.in_flight() <= MAX_IN_FLIGHT_WRITES);
    }

    #[test]
    fn store_sink_without_runtime_drops() {
        let sink = StoreSink::new("127.0.0.1:6379", Duration::from_millis(100)).unwrap();
        sink.persist(&MetricSample::now(1.0, 2.0));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(sink.in_flight(), 0);
    }

    #[test]
    fn write_slot_is_released_when_writer_panics() {
        let sink = StoreSink::new("127.0.0.1:6379", Duration::from_millis(100)).unwrap();
        let slots: Vec<_> = (0..MAX_IN_FLIGHT_WRITES)
            .map(|_| sink.try_reserve().unwrap())
            .collect();
        assert!(sink.try_reserve().is_none());

        let mut slots = slots.into_iter();
        let doomed = slots.next().unwrap();
        let writer = std::thread::spawn(move || {
            let _slot = doomed;
            panic!("store write blew up");
        });
        assert!(writer.join().is_err());

        assert_eq!(sink.in_flight(), MAX_IN_FLIGHT_WRITES - 1);
        assert!(sink.try_reserve().is_some());
        drop(slots);
        assert_eq!(sink.in_flight(), 0);
    }

    #[tokio::test]
    async fn probe_reports_unreachable_store() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(!probe_store(&addr, Duration::from_millis(200)).await);
    }
}
