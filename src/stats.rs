//! Reduction of a completed run into summary statistics.
//!
//! Percentiles use linear interpolation on the sorted sample (the inclusive
//! method): rank `p/100 * (n-1)`, interpolating between the two neighbouring
//! order statistics. All outputs are finite; when a section has no data the
//! corresponding field is absent rather than NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sink::ResultSink;

/// Distribution statistics over successful response times, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation; 0 for a single sample.
    pub std_dev: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Response body size statistics over successful requests, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeStats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub median: f64,
}

/// Connection-phase statistics (DNS resolution or connection creation),
/// in seconds, over whatever samples the client hooks produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub mean: f64,
    pub max: f64,
}

/// Aggregate metrics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    /// successful / total, as a percentage. 0 when no requests ran.
    pub success_rate: f64,

    /// Wall-clock duration of the whole run, in seconds.
    pub total_duration: f64,

    pub requests_per_second: f64,
    pub throughput_bytes_per_sec: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_times: Option<ResponseTimeStats>,

    /// Requests that received a real response, by status code. Assertion
    /// failures carry a real status and are counted here even though they
    /// count as failed requests.
    pub status_code_distribution: BTreeMap<u16, u64>,

    /// Failed requests keyed by kind-prefixed error message.
    pub error_distribution: BTreeMap<String, u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_sizes: Option<SizeStats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<PhaseStats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<PhaseStats>,
}

impl Summary {
    /// Reduces the drained sink into summary metrics.
    pub fn compute(sink: &ResultSink, total_duration: f64) -> Self {
        let total = sink.results.len() as u64;
        let successful = sink.results.iter().filter(|r| r.is_success()).count() as u64;
        let failed = total - successful;

        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let total_bytes: u64 = sink.response_sizes.iter().sum();
        let (requests_per_second, throughput_bytes_per_sec) = if total_duration > 0.0 {
            (
                total as f64 / total_duration,
                total_bytes as f64 / total_duration,
            )
        } else {
            (0.0, 0.0)
        };

        let mut response_times: Vec<f64> = sink
            .results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.response_time)
            .collect();
        response_times.sort_by(|a, b| a.total_cmp(b));

        let mut status_code_distribution = BTreeMap::new();
        let mut error_distribution = BTreeMap::new();
        for result in &sink.results {
            if result.status_code > 0 {
                *status_code_distribution
                    .entry(result.status_code)
                    .or_insert(0) += 1;
            }
            if let Some(error) = &result.error {
                *error_distribution.entry(error.to_string()).or_insert(0) += 1;
            }
        }

        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate,
            total_duration,
            requests_per_second,
            throughput_bytes_per_sec,
            response_times: response_time_stats(&response_times),
            status_code_distribution,
            error_distribution,
            response_sizes: size_stats(&sink.response_sizes),
            dns: phase_stats(&sink.dns_samples),
            connect: phase_stats(&sink.connect_samples),
        }
    }
}

fn response_time_stats(sorted: &[f64]) -> Option<ResponseTimeStats> {
    if sorted.is_empty() {
        return None;
    }
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    Some(ResponseTimeStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean,
        median: percentile(sorted, 50.0),
        std_dev: population_std_dev(sorted, mean),
        p25: percentile(sorted, 25.0),
        p50: percentile(sorted, 50.0),
        p75: percentile(sorted, 75.0),
        p90: percentile(sorted, 90.0),
        p95: percentile(sorted, 95.0),
        p99: percentile(sorted, 99.0),
    })
}

fn size_stats(sizes: &[u64]) -> Option<SizeStats> {
    if sizes.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(SizeStats {
        min: *sizes.iter().min().unwrap_or(&0),
        max: *sizes.iter().max().unwrap_or(&0),
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        median: percentile(&sorted, 50.0),
    })
}

fn phase_stats(samples: &[std::time::Duration]) -> Option<PhaseStats> {
    if samples.is_empty() {
        return None;
    }
    let secs: Vec<f64> = samples.iter().map(|d| d.as_secs_f64()).collect();
    let mean = secs.iter().sum::<f64>() / secs.len() as f64;
    let max = secs.iter().cloned().fold(f64::MIN, f64::max);
    Some(PhaseStats { mean, max })
}

/// Inclusive-method percentile over a sorted, non-empty sample.
///
/// A single-element sample yields that element at every rank, which is also
/// the nearest-extreme fallback for ranks that cannot interpolate.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn population_std_dev(sample: &[f64], mean: f64) -> f64 {
    if sample.len() < 2 {
        return 0.0;
    }
    let variance = sample
        .iter()
        .map(|value| {
            let delta = value - mean;
            delta * delta
        })
        .sum::<f64>()
        / sample.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, RequestError};
    use crate::sink::RequestResult;

    fn result(status: u16, time: f64, size: u64, error: Option<RequestError>) -> RequestResult {
        RequestResult {
            url: "http://localhost/".to_string(),
            method: "GET".to_string(),
            status_code: status,
            response_time: time,
            timestamp: 1_700_000_000.0,
            response_size: size,
            error,
        }
    }

    fn sink_of(results: Vec<RequestResult>) -> ResultSink {
        let mut sink = ResultSink::default();
        for r in results {
            if r.is_success() {
                sink.response_sizes.push(r.response_size);
            }
            sink.results.push(r);
        }
        sink
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert!((percentile(&sorted, 25.0) - 3.25).abs() < 1e-9);
        assert!((percentile(&sorted, 50.0) - 5.5).abs() < 1e-9);
        assert!((percentile(&sorted, 75.0) - 7.75).abs() < 1e-9);
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&sorted, 100.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_single_sample_is_that_sample() {
        let sorted = vec![0.42];
        for p in [25.0, 50.0, 90.0, 99.0] {
            assert_eq!(percentile(&sorted, p), 0.42);
        }
    }

    #[test]
    fn test_percentiles_are_monotonic() {
        let mut sorted: Vec<f64> = vec![0.08, 0.003, 0.2, 0.011, 0.04, 0.015, 0.9];
        sorted.sort_by(|a, b| a.total_cmp(b));
        let stats = response_time_stats(&sorted).unwrap();
        assert!(stats.min <= stats.p25);
        assert!(stats.p25 <= stats.p50);
        assert!(stats.p50 <= stats.p75);
        assert!(stats.p75 <= stats.p90);
        assert!(stats.p90 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.max);
    }

    #[test]
    fn test_empty_sink_yields_absent_sections() {
        let summary = Summary::compute(&ResultSink::default(), 1.0);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(summary.response_times.is_none());
        assert!(summary.response_sizes.is_none());
        assert!(summary.dns.is_none());
        assert!(summary.connect.is_none());
        assert!(summary.status_code_distribution.is_empty());
    }

    #[test]
    fn test_counts_and_rates() {
        let sink = sink_of(vec![
            result(200, 0.01, 100, None),
            result(200, 0.03, 300, None),
            result(0, 0.02, 0, Some(RequestError::new(ErrorKind::Network, "refused"))),
        ]);
        let summary = Summary::compute(&sink, 2.0);

        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.successful_requests, 2);
        assert_eq!(summary.failed_requests, 1);
        assert!((summary.success_rate - 66.666).abs() < 0.01);
        assert!((summary.requests_per_second - 1.5).abs() < 1e-9);
        assert!((summary.throughput_bytes_per_sec - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_assertion_failures_keep_their_status_in_the_distribution() {
        let sink = sink_of(vec![
            result(200, 0.01, 10, None),
            result(
                500,
                0.01,
                20,
                Some(RequestError::new(
                    ErrorKind::AssertStatus,
                    "expected status 200, got 500",
                )),
            ),
        ]);
        let summary = Summary::compute(&sink, 1.0);

        // The server replied, so the 500 shows up in the distribution even
        // though the request counts as failed.
        assert_eq!(summary.status_code_distribution.get(&200), Some(&1));
        assert_eq!(summary.status_code_distribution.get(&500), Some(&1));
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(
            summary
                .error_distribution
                .get("assert_status: expected status 200, got 500"),
            Some(&1)
        );
    }

    #[test]
    fn test_transport_failures_stay_out_of_the_status_distribution() {
        let sink = sink_of(vec![result(
            0,
            0.02,
            0,
            Some(RequestError::new(ErrorKind::Timeout, "deadline elapsed")),
        )]);
        let summary = Summary::compute(&sink, 1.0);
        assert!(summary.status_code_distribution.is_empty());
        assert_eq!(summary.error_distribution.len(), 1);
    }

    #[test]
    fn test_std_dev_population() {
        let sorted = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        assert!((population_std_dev(&sorted, mean) - 2.0).abs() < 1e-9);
        assert_eq!(population_std_dev(&[3.5], 3.5), 0.0);
    }

    #[test]
    fn test_size_and_phase_stats() {
        let mut sink = sink_of(vec![
            result(200, 0.01, 100, None),
            result(200, 0.01, 200, None),
        ]);
        sink.dns_samples.push(std::time::Duration::from_millis(4));
        sink.dns_samples.push(std::time::Duration::from_millis(8));
        sink.connect_samples
            .push(std::time::Duration::from_millis(10));

        let summary = Summary::compute(&sink, 1.0);
        let sizes = summary.response_sizes.unwrap();
        assert_eq!(sizes.min, 100);
        assert_eq!(sizes.max, 200);
        assert!((sizes.mean - 150.0).abs() < 1e-9);
        assert!((sizes.median - 150.0).abs() < 1e-9);

        let dns = summary.dns.unwrap();
        assert!((dns.mean - 0.006).abs() < 1e-9);
        assert!((dns.max - 0.008).abs() < 1e-9);
        let connect = summary.connect.unwrap();
        assert!((connect.mean - 0.010).abs() < 1e-9);
    }
}
