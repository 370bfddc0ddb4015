//! Per-request results and the run-scoped collector that owns them.
//!
//! Workers and the HTTP client's timing hooks send messages over a channel;
//! a single collector task appends to the store. Nothing else touches the
//! store until the run has drained, so no lock is ever held across an await
//! point and the post-run snapshot is consistent by construction.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{EngineError, RequestError};

/// Outcome of a single request attempt. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    /// The URL that was requested.
    pub url: String,

    /// HTTP method used.
    pub method: String,

    /// Status code returned; 0 when no response was obtained.
    pub status_code: u16,

    /// Monotonic time in seconds from just before dispatch to just after the
    /// full body was read.
    pub response_time: f64,

    /// Wall-clock unix timestamp (seconds) at dispatch.
    pub timestamp: f64,

    /// Response body size in bytes; 0 on failure.
    pub response_size: u64,

    /// Classified failure, if any. Assertion failures keep the real
    /// `status_code` alongside the error.
    pub error: Option<RequestError>,
}

impl RequestResult {
    /// A request counts as successful when it carries no error of any kind.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Messages accepted by the collector.
#[derive(Debug)]
pub enum SinkMessage {
    Result(RequestResult),
    DnsSample(Duration),
    ConnectSample(Duration),
}

/// Observer invoked on each submitted result with the running total.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Cloneable producer side of the sink.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl SinkHandle {
    /// Hands a result to the collector. Fails only when the collector is
    /// gone, which a worker must treat as fatal.
    pub fn submit(&self, result: RequestResult) -> Result<(), EngineError> {
        self.tx
            .send(SinkMessage::Result(result))
            .map_err(|_| EngineError::SinkClosed)
    }

    /// Records a fresh DNS resolution duration. Best-effort.
    pub fn record_dns(&self, sample: Duration) {
        let _ = self.tx.send(SinkMessage::DnsSample(sample));
    }

    /// Records a fresh connection-establishment duration. Best-effort.
    pub fn record_connect(&self, sample: Duration) {
        let _ = self.tx.send(SinkMessage::ConnectSample(sample));
    }
}

/// Append-only store of everything a run produced.
#[derive(Debug, Default)]
pub struct ResultSink {
    /// Results in submit order, which is not chronological order; use each
    /// result's timestamp when chronology matters.
    pub results: Vec<RequestResult>,

    /// Durations of fresh DNS resolutions observed during the run.
    pub dns_samples: Vec<Duration>,

    /// Durations of fresh connection establishments observed during the run.
    pub connect_samples: Vec<Duration>,

    /// Body sizes of successful responses, in submit order.
    pub response_sizes: Vec<u64>,
}

/// Starts the collector task. The returned handle is the only way to feed
/// the sink; the join handle yields the completed store once every producer
/// handle has been dropped.
pub fn spawn_collector(progress: Option<ProgressFn>) -> (SinkHandle, JoinHandle<ResultSink>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut sink = ResultSink::default();
        while let Some(message) = rx.recv().await {
            match message {
                SinkMessage::Result(result) => {
                    if result.is_success() {
                        sink.response_sizes.push(result.response_size);
                    }
                    sink.results.push(result);
                    if let Some(progress) = &progress {
                        progress(sink.results.len() as u64);
                    }
                }
                SinkMessage::DnsSample(sample) => sink.dns_samples.push(sample),
                SinkMessage::ConnectSample(sample) => sink.connect_samples.push(sample),
            }
        }
        sink
    });

    (SinkHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, RequestError};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ok_result(size: u64) -> RequestResult {
        RequestResult {
            url: "http://localhost/".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            response_time: 0.005,
            timestamp: 1_700_000_000.0,
            response_size: size,
            error: None,
        }
    }

    fn failed_result() -> RequestResult {
        RequestResult {
            status_code: 0,
            response_size: 0,
            error: Some(RequestError::new(ErrorKind::Network, "connection refused")),
            ..ok_result(0)
        }
    }

    #[tokio::test]
    async fn test_collector_preserves_submit_order_and_sizes() {
        let (handle, task) = spawn_collector(None);

        handle.submit(ok_result(10)).unwrap();
        handle.submit(failed_result()).unwrap();
        handle.submit(ok_result(30)).unwrap();
        handle.record_dns(Duration::from_millis(2));
        handle.record_connect(Duration::from_millis(5));
        drop(handle);

        let sink = task.await.unwrap();
        assert_eq!(sink.results.len(), 3);
        assert_eq!(sink.results[1].status_code, 0);
        // Only successful responses contribute sizes.
        assert_eq!(sink.response_sizes, vec![10, 30]);
        assert_eq!(sink.dns_samples, vec![Duration::from_millis(2)]);
        assert_eq!(sink.connect_samples, vec![Duration::from_millis(5)]);
    }

    #[tokio::test]
    async fn test_progress_observer_sees_each_submission() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_in_callback = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |count| {
            seen_in_callback.store(count, Ordering::SeqCst);
        });

        let (handle, task) = spawn_collector(Some(progress));
        handle.submit(ok_result(1)).unwrap();
        handle.submit(ok_result(2)).unwrap();
        drop(handle);

        task.await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_after_collector_gone_fails() {
        let (handle, task) = spawn_collector(None);
        task.abort();
        let _ = task.await;

        let rejected = handle.submit(ok_result(1));
        assert!(rejected.is_err());
    }

    #[test]
    fn test_result_serde_round_trip() {
        let result = failed_result();
        let json = serde_json::to_string(&result).unwrap();
        let back: RequestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
