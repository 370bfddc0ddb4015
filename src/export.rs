//! Structured export of run results.
//!
//! Two formats: CSV (one row per request) and JSON (summary plus results).
//! Both parse back into records equal to the originals, so exports can feed
//! downstream analysis without loss.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, RequestError};
use crate::sink::RequestResult;
use crate::stats::Summary;
use crate::supervisor::RunResult;

/// Flat CSV row for one request. The error travels as a (kind, message)
/// column pair; both empty for successful requests.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    timestamp: f64,
    url: String,
    method: String,
    status_code: u16,
    response_time: f64,
    response_size: u64,
    error_kind: String,
    error_message: String,
}

impl From<&RequestResult> for CsvRecord {
    fn from(result: &RequestResult) -> Self {
        let (error_kind, error_message) = match &result.error {
            Some(error) => (error.kind.label().to_string(), error.message.clone()),
            None => (String::new(), String::new()),
        };
        Self {
            timestamp: result.timestamp,
            url: result.url.clone(),
            method: result.method.clone(),
            status_code: result.status_code,
            response_time: result.response_time,
            response_size: result.response_size,
            error_kind,
            error_message,
        }
    }
}

impl From<CsvRecord> for RequestResult {
    fn from(record: CsvRecord) -> Self {
        let error = ErrorKind::from_label(&record.error_kind)
            .map(|kind| RequestError::new(kind, record.error_message));
        Self {
            url: record.url,
            method: record.method,
            status_code: record.status_code,
            response_time: record.response_time,
            timestamp: record.timestamp,
            response_size: record.response_size,
            error,
        }
    }
}

/// Writes results as CSV to any writer.
pub fn write_csv<W: io::Write>(results: &[RequestResult], writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for result in results {
        csv_writer.serialize(CsvRecord::from(result))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes results as CSV to a file.
pub fn write_csv_file(results: &[RequestResult], path: &Path) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_path(path)?;
    for result in results {
        csv_writer.serialize(CsvRecord::from(result))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Parses a CSV export back into results.
pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<RequestResult>, csv::Error> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut results = Vec::new();
    for record in csv_reader.deserialize::<CsvRecord>() {
        results.push(record?.into());
    }
    Ok(results)
}

/// Serializes the whole run (summary first, then results) as pretty JSON.
pub fn to_json(run: &RunResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(run)
}

/// Parses a JSON export back into a run view.
pub fn from_json(json: &str) -> serde_json::Result<RunResult> {
    serde_json::from_str(json)
}

/// Human-readable end-of-run summary for terminal output.
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();

    out.push_str("\n=== Run summary ===\n");
    out.push_str(&format!(
        "requests:    {} total, {} ok, {} failed ({:.1}% success)\n",
        summary.total_requests,
        summary.successful_requests,
        summary.failed_requests,
        summary.success_rate,
    ));
    out.push_str(&format!(
        "duration:    {:.2}s ({:.1} req/s, {:.0} B/s)\n",
        summary.total_duration, summary.requests_per_second, summary.throughput_bytes_per_sec,
    ));

    if let Some(rt) = &summary.response_times {
        out.push_str(&format!(
            "latency:     min {:.1}ms, mean {:.1}ms, median {:.1}ms, max {:.1}ms, stdev {:.1}ms\n",
            rt.min * 1000.0,
            rt.mean * 1000.0,
            rt.median * 1000.0,
            rt.max * 1000.0,
            rt.std_dev * 1000.0,
        ));
        out.push_str(&format!(
            "percentiles: p25 {:.1}ms, p50 {:.1}ms, p75 {:.1}ms, p90 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms\n",
            rt.p25 * 1000.0,
            rt.p50 * 1000.0,
            rt.p75 * 1000.0,
            rt.p90 * 1000.0,
            rt.p95 * 1000.0,
            rt.p99 * 1000.0,
        ));
    }

    if let Some(sizes) = &summary.response_sizes {
        out.push_str(&format!(
            "sizes:       min {} B, mean {:.0} B, median {:.0} B, max {} B\n",
            sizes.min, sizes.mean, sizes.median, sizes.max,
        ));
    }

    if let Some(dns) = &summary.dns {
        out.push_str(&format!(
            "dns:         mean {:.2}ms, max {:.2}ms\n",
            dns.mean * 1000.0,
            dns.max * 1000.0,
        ));
    }
    if let Some(connect) = &summary.connect {
        out.push_str(&format!(
            "connect:     mean {:.2}ms, max {:.2}ms\n",
            connect.mean * 1000.0,
            connect.max * 1000.0,
        ));
    }

    if !summary.status_code_distribution.is_empty() {
        out.push_str("status codes:\n");
        for (code, count) in &summary.status_code_distribution {
            out.push_str(&format!("  {}: {}\n", code, count));
        }
    }

    if !summary.error_distribution.is_empty() {
        out.push_str("errors:\n");
        for (error, count) in &summary.error_distribution {
            out.push_str(&format!("  {}: {}\n", error, count));
        }
    }

    out
}
