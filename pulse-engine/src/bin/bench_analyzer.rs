//! # Analyzer Throughput Bench
//!
//! Replays a fixed, seeded traffic trace through one `Analyzer` and reports
//! insert and read rates. Optional reader threads hammer `current_result`
//! while the inserts run, to show read/write lock contention.
//!
//! Usage: `bench_analyzer [window_size] [op_count] [reader_threads]`

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pulse_common::MetricSample;
use pulse_engine::{Analyzer, DEFAULT_WINDOW_CAPACITY};

const TRACE_LEN: usize = 4096;
const TRACE_SEED: u64 = 0x9E37_79B9_7F4A_7C15;
/// Every Nth trace entry is a traffic spike.
const SPIKE_EVERY: usize = 97;

struct Params {
    window: usize,
    ops: usize,
    readers: usize,
}

fn params() -> Params {
    let mut positional = std::env::args()
        .skip(1)
        .map(|arg| arg.parse::<usize>().ok());
    let mut next_or = |fallback: usize| positional.next().flatten().unwrap_or(fallback);
    Params {
        window: next_or(DEFAULT_WINDOW_CAPACITY),
        ops: next_or(500_000),
        readers: next_or(0),
    }
}

/// Seeded splitmix64 stream mapped onto `[0, 1)`.
fn unit_stream(mut seed: u64) -> impl Iterator<Item = f64> {
    std::iter::repeat_with(move || {
        seed = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 53) as f64
    })
}

fn traffic_trace() -> Vec<MetricSample> {
    let mut units = unit_stream(TRACE_SEED);
    let mut draw = move || units.next().unwrap_or(0.5);
    (0..TRACE_LEN)
        .map(|step| {
            let cpu = 100.0 * draw();
            let rps = match step % SPIKE_EVERY {
                0 => 10_000.0,
                _ => 1_000.0 + 200.0 * (draw() - 0.5),
            };
            MetricSample::now(cpu, rps)
        })
        .collect()
}

fn print_rate(phase: &str, ops: usize, took: Duration) {
    let secs = took.as_secs_f64().max(f64::EPSILON);
    println!(
        "{phase:<6} {ops:>9} ops  {:>8.3}s  {:>12.0} ops/s  {:>8.1} ns/op",
        secs,
        ops as f64 / secs,
        secs * 1e9 / ops.max(1) as f64
    );
}

fn main() {
    let Params { window, ops, readers } = params();
    let analyzer = Arc::new(Analyzer::new(window));
    let trace = traffic_trace();
    println!("window={} ops={ops} readers={readers}", analyzer.capacity());

    let background: Vec<_> = (0..readers)
        .map(|_| {
            let analyzer = Arc::clone(&analyzer);
            thread::spawn(move || (0..ops).for_each(|_| drop(black_box(analyzer.current_result()))))
        })
        .collect();

    let started = Instant::now();
    let flagged = trace
        .iter()
        .cycle()
        .take(ops)
        .filter(|sample| black_box(analyzer.insert(**sample)).is_anomaly_rps)
        .count();
    print_rate("insert", ops, started.elapsed());
    println!("flagged {flagged} anomalies");

    for handle in background {
        let _ = handle.join();
    }

    let started = Instant::now();
    for _ in 0..ops {
        black_box(analyzer.current_result());
    }
    print_rate("read", ops, started.elapsed());
}
