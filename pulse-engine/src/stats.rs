//! # Window Statistics
//!
//! Population statistics over a window snapshot and the z-score of the most
//! recent sample's RPS.
//!
//! ## Logic
//! 1. First pass: sum CPU and RPS, remember the last sample.
//! 2. Means divide by `n` (population mean).
//! 3. Second pass: population variance of RPS, divisor `n`, not `n - 1`.
//! 4. `z = (last.rps - avg_rps) / std`, or `0` when `std == 0`.
//! 5. Anomaly when `|z| > ANOMALY_ZSCORE_THRESHOLD`.
//!
//! Each call rescans the whole window: O(n) with n bounded by the window
//! capacity.

use pulse_common::{AnalysisResult, MetricSample};

/// Fixed z-score magnitude above which the latest RPS is an anomaly.
pub const ANOMALY_ZSCORE_THRESHOLD: f64 = 2.0;

/// Computes rolling statistics over `samples` (oldest first).
///
/// An empty input yields `AnalysisResult::default()`.
pub fn compute_stats<'a, I>(samples: I) -> AnalysisResult
where
    I: IntoIterator<Item = &'a MetricSample>,
    I::IntoIter: Clone,
{
    let iter = samples.into_iter();

    let mut count = 0usize;
    let mut sum_cpu = 0.0;
    let mut sum_rps = 0.0;
    let mut last: Option<&MetricSample> = None;
    for sample in iter.clone() {
        count += 1;
        sum_cpu += sample.cpu();
        sum_rps += sample.rps();
        last = Some(sample);
    }

    let last = match last {
        Some(sample) => sample,
        None => return AnalysisResult::default(),
    };

    let n = count as f64;
    let avg_cpu = sum_cpu / n;
    let avg_rps = sum_rps / n;

    let variance = iter
        .map(|sample| {
            let delta = sample.rps() - avg_rps;
            delta * delta
        })
        .sum::<f64>()
        / n;
    let std = variance.sqrt();

    // Identical values: the latest sample sits exactly on the mean.
    let zscore_rps = if std > 0.0 {
        (last.rps() - avg_rps) / std
    } else {
        0.0
    };

    AnalysisResult {
        count,
        avg_cpu,
        avg_rps,
        last_timestamp: Some(last.timestamp()),
        last_rps: last.rps(),
        is_anomaly_rps: zscore_rps.abs() > ANOMALY_ZSCORE_THRESHOLD,
        zscore_rps,
        window_size_used: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn samples(values: &[(f64, f64)]) -> Vec<MetricSample> {
        values
            .iter()
            .enumerate()
            .map(|(idx, &(cpu, rps))| {
                MetricSample::from_epoch_millis(1_000 + idx as i64, cpu, rps).unwrap()
            })
            .collect()
    }

    fn rps_only(values: &[f64]) -> Vec<MetricSample> {
        let pairs: Vec<(f64, f64)> = values.iter().map(|&rps| (0.0, rps)).collect();
        samples(&pairs)
    }

    #[test]
    fn empty_input_is_zero_result() {
        let result = compute_stats(&Vec::<MetricSample>::new());
        assert_eq!(result, AnalysisResult::default());
        assert!(!result.is_anomaly_rps);
    }

    #[test]
    fn computes_population_means() {
        let window = samples(&[(10.0, 100.0), (20.0, 200.0), (30.0, 600.0)]);
        let result = compute_stats(&window);
        assert_eq!(result.count, 3);
        assert_eq!(result.window_size_used, 3);
        assert!((result.avg_cpu - 20.0).abs() < 1e-9);
        assert!((result.avg_rps - 300.0).abs() < 1e-9);
        assert_eq!(result.last_rps, 600.0);
        assert_eq!(result.last_timestamp, Some(window[2].timestamp()));
    }

    #[test]
    fn uses_population_variance() {
        // mean 5, population variance 4 (sample variance would be 32/7).
        let window = rps_only(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let result = compute_stats(&window);
        assert!((result.zscore_rps - 2.0).abs() < 1e-9);
        // Exactly at the threshold is not an anomaly.
        assert!(!result.is_anomaly_rps);
    }

    #[test]
    fn zero_variance_yields_zero_zscore() {
        let window = rps_only(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        let result = compute_stats(&window);
        assert_eq!(result.zscore_rps, 0.0);
        assert!(!result.is_anomaly_rps);
    }

    #[test]
    fn single_sample_is_never_anomalous() {
        let window = rps_only(&[1234.0]);
        let result = compute_stats(&window);
        assert_eq!(result.count, 1);
        assert_eq!(result.zscore_rps, 0.0);
        assert!(!result.is_anomaly_rps);
    }

    #[test]
    fn spike_is_flagged() {
        let window = rps_only(&[10.0, 10.0, 10.0, 10.0, 10.0, 1000.0]);
        let result = compute_stats(&window);
        assert!(result.zscore_rps > ANOMALY_ZSCORE_THRESHOLD);
        assert!(result.is_anomaly_rps);
    }

    #[test]
    fn drop_is_flagged_with_negative_zscore() {
        let window = rps_only(&[1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 0.0]);
        let result = compute_stats(&window);
        assert!(result.zscore_rps < -ANOMALY_ZSCORE_THRESHOLD);
        assert!(result.is_anomaly_rps);
    }

    proptest! {
        #[test]
        fn avg_rps_matches_direct_mean(values in proptest::collection::vec(0.0f64..100_000.0, 1..64)) {
            let window = rps_only(&values);
            let result = compute_stats(&window);
            let expected = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert_eq!(result.count, values.len());
            prop_assert!((result.avg_rps - expected).abs() <= 1e-9 * expected.abs().max(1.0));
            prop_assert_eq!(result.last_rps, *values.last().unwrap());
        }
    }
}
