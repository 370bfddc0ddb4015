//! Error taxonomy for per-request outcomes and run-level failures.
//!
//! Per-request errors are data: they are captured in a `RequestResult` and
//! never bubble through a worker's control flow. Configuration problems are
//! rejected before the run starts; only run-level faults (client construction,
//! a dead collector, a worker panic) abort a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kinds of per-request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS failure, connection refused, TLS handshake failure, or a
    /// read/write failure mid-request.
    Network,

    /// The per-request deadline expired.
    Timeout,

    /// The run was cancelled while the request was in flight.
    Cancelled,

    /// A body file or form file could not be read.
    File,

    /// Response received but its status did not match the asserted status.
    AssertStatus,

    /// Response received but its body did not contain the asserted substring.
    AssertBody,

    /// Response received but took longer than the asserted maximum.
    AssertMaxRt,

    /// The body-substring assertion could not decode the body.
    Decode,
}

impl ErrorKind {
    /// Short machine-friendly label, used as the error-distribution key prefix.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::File => "file",
            ErrorKind::AssertStatus => "assert_status",
            ErrorKind::AssertBody => "assert_body",
            ErrorKind::AssertMaxRt => "assert_max_rt",
            ErrorKind::Decode => "decode",
        }
    }

    /// Inverse of `label`, for parsing exported results back.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "network" => Some(ErrorKind::Network),
            "timeout" => Some(ErrorKind::Timeout),
            "cancelled" => Some(ErrorKind::Cancelled),
            "file" => Some(ErrorKind::File),
            "assert_status" => Some(ErrorKind::AssertStatus),
            "assert_body" => Some(ErrorKind::AssertBody),
            "assert_max_rt" => Some(ErrorKind::AssertMaxRt),
            "decode" => Some(ErrorKind::Decode),
            _ => None,
        }
    }

    /// True for the assertion family: a real response was obtained but failed
    /// a user-supplied check.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            ErrorKind::AssertStatus | ErrorKind::AssertBody | ErrorKind::AssertMaxRt | ErrorKind::Decode
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A classified per-request error, carried inside `RequestResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a `reqwest` failure into the taxonomy.
    ///
    /// Timeouts are reported as `Timeout`; everything else the HTTP layer can
    /// produce (DNS, connect, TLS, mid-stream read/write, decode) is a
    /// `Network` failure. The original error text is kept as the message.
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Network
        };

        // reqwest wraps the interesting cause (dns error, connection refused,
        // certificate problem) in its source chain; flatten it into one line.
        let mut message = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            message = format!("{}: {}", message, cause);
            source = cause.source();
        }

        Self { kind, message }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled")
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

/// Configuration problems detected before the run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one target URL is required")]
    NoUrls,

    #[error("unsupported HTTP method: '{0}'. Use GET, POST, PUT, DELETE, HEAD, or OPTIONS")]
    InvalidMethod(String),

    #[error("number of requests ({num_requests}) cannot be smaller than concurrency ({concurrency})")]
    NotEnoughRequests { num_requests: u64, concurrency: usize },

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("cannot set both an inline body and a body file")]
    ConflictingBodies,

    #[error("authentication format should be 'username:password'")]
    MalformedAuth,

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid ramp plan: {0}")]
    InvalidRampPlan(String),
}

/// Run-level failures surfaced to the host.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("result collector terminated before the run drained")]
    SinkClosed,

    #[error("worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(ErrorKind::Network.label(), "network");
        assert_eq!(ErrorKind::Timeout.label(), "timeout");
        assert_eq!(ErrorKind::Cancelled.label(), "cancelled");
        assert_eq!(ErrorKind::AssertStatus.label(), "assert_status");
    }

    #[test]
    fn test_labels_round_trip() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
            ErrorKind::File,
            ErrorKind::AssertStatus,
            ErrorKind::AssertBody,
            ErrorKind::AssertMaxRt,
            ErrorKind::Decode,
        ] {
            assert_eq!(ErrorKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(ErrorKind::from_label("bogus"), None);
    }

    #[test]
    fn test_assertion_family() {
        assert!(ErrorKind::AssertStatus.is_assertion());
        assert!(ErrorKind::AssertBody.is_assertion());
        assert!(ErrorKind::AssertMaxRt.is_assertion());
        assert!(ErrorKind::Decode.is_assertion());
        assert!(!ErrorKind::Network.is_assertion());
        assert!(!ErrorKind::Cancelled.is_assertion());
    }

    #[test]
    fn test_display_is_kind_prefixed() {
        let err = RequestError::new(ErrorKind::AssertStatus, "expected 200, got 500");
        assert_eq!(err.to_string(), "assert_status: expected 200, got 500");
    }

    #[test]
    fn test_serde_round_trip() {
        let err = RequestError::new(ErrorKind::Timeout, "deadline elapsed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"timeout\""));
        let back: RequestError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
