//! Run configuration: targets, workload shape, request construction policy.
//!
//! A `TestConfig` is built by the host layer, validated once, and immutable
//! for the rest of the run. Everything the request builder needs (method,
//! headers, body, auth, proxy, protocol flags) lives here.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// HTTP methods supported by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(ConfigError::InvalidMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// What ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Stop after this many requests have been issued and completed.
    Count(u64),
    /// Stop when this much wall-clock time has elapsed.
    Deadline(Duration),
}

/// Immutable description of one load-test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Target URLs; requests rotate through them round-robin by work id.
    pub urls: Vec<String>,

    /// HTTP method used for every request.
    pub method: Method,

    /// Total number of requests for count-terminated runs. Ignored when
    /// `duration` is set (duration wins).
    pub num_requests: u64,

    /// Number of concurrent workers.
    pub concurrency: usize,

    /// Per-worker rate limit in requests per second.
    pub rate_limit: Option<f64>,

    /// Wall-clock cap for the run. When set, `num_requests` is ignored.
    pub duration: Option<Duration>,

    /// Per-request timeout covering connect, send, receive and body read.
    pub timeout: Duration,

    /// Extra request headers, sent as supplied.
    pub headers: Vec<(String, String)>,

    /// Inline request body. Mutually exclusive with `body_file`.
    pub body: Option<String>,

    /// Path to a file whose contents become the request body.
    pub body_file: Option<PathBuf>,

    /// Content-Type header applied when a raw body is sent.
    pub content_type: String,

    /// Basic-auth credentials.
    pub basic_auth: Option<(String, String)>,

    /// Forward HTTP proxy as `host:port`.
    pub proxy: Option<String>,

    /// Allow HTTP/2 negotiation; otherwise the client speaks HTTP/1.1 only.
    pub http2: bool,

    /// Override for the outgoing `Host` header. Does not change the
    /// connection target.
    pub host: Option<String>,

    pub disable_compression: bool,
    pub disable_keepalive: bool,
    pub disable_redirects: bool,

    /// Multipart form fields. Any form content switches the request body to
    /// `multipart/form-data` and `body`/`body_file` are ignored.
    pub form: Vec<(String, String)>,

    /// Multipart file fields as (field name, path).
    pub form_files: Vec<(String, PathBuf)>,
}

impl TestConfig {
    /// A config with the default workload shape against the given targets.
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            method: Method::Get,
            num_requests: 200,
            concurrency: 50,
            rate_limit: None,
            duration: None,
            timeout: Duration::from_secs(20),
            headers: Vec::new(),
            body: None,
            body_file: None,
            content_type: "text/html".to_string(),
            basic_auth: None,
            proxy: None,
            http2: false,
            host: None,
            disable_compression: false,
            disable_keepalive: false,
            disable_redirects: false,
            form: Vec::new(),
            form_files: Vec::new(),
        }
    }

    /// Which termination policy governs this run. Duration wins when both
    /// are present.
    pub fn termination(&self) -> Termination {
        match self.duration {
            Some(d) => Termination::Deadline(d),
            None => Termination::Count(self.num_requests),
        }
    }

    /// True when the request body is encoded as multipart/form-data.
    pub fn uses_form(&self) -> bool {
        !self.form.is_empty() || !self.form_files.is_empty()
    }

    /// Rejects invalid configurations before any worker is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::NonPositive {
                field: "concurrency",
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositive { field: "timeout" });
        }
        match self.duration {
            Some(d) if d.is_zero() => {
                return Err(ConfigError::NonPositive { field: "duration" });
            }
            Some(_) => {}
            None => {
                if self.num_requests == 0 {
                    return Err(ConfigError::NonPositive {
                        field: "num_requests",
                    });
                }
                if self.num_requests < self.concurrency as u64 {
                    return Err(ConfigError::NotEnoughRequests {
                        num_requests: self.num_requests,
                        concurrency: self.concurrency,
                    });
                }
            }
        }
        if let Some(rate) = self.rate_limit {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::NonPositive { field: "rate_limit" });
            }
        }
        if self.body.is_some() && self.body_file.is_some() {
            return Err(ConfigError::ConflictingBodies);
        }
        Ok(())
    }
}

/// Open-loop ramp-up schedule: grow the worker population from `initial`
/// to `max` in steps of `increment`, one step every `interval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampPlan {
    pub initial: usize,
    pub max: usize,
    pub interval: Duration,
    pub increment: usize,
}

impl RampPlan {
    /// Validates the plan against the run's configured concurrency.
    pub fn validate(&self, concurrency: usize) -> Result<(), ConfigError> {
        if self.initial == 0 {
            return Err(ConfigError::InvalidRampPlan(
                "initial worker count must be at least 1".to_string(),
            ));
        }
        if self.max < self.initial {
            return Err(ConfigError::InvalidRampPlan(format!(
                "max ({}) must be at least initial ({})",
                self.max, self.initial
            )));
        }
        if self.max > concurrency {
            return Err(ConfigError::InvalidRampPlan(format!(
                "max ({}) cannot exceed concurrency ({})",
                self.max, concurrency
            )));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidRampPlan(
                "interval must be positive".to_string(),
            ));
        }
        if self.increment == 0 {
            return Err(ConfigError::InvalidRampPlan(
                "increment must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Post-response checks. Any failed check reclassifies the response as a
/// failure while keeping the real status code on record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssertionSpec {
    /// Exact status code the response must carry.
    pub status: Option<u16>,

    /// Substring the (leniently decoded) body must contain.
    pub body_contains: Option<String>,

    /// Maximum acceptable response time.
    pub max_response_time: Option<Duration>,
}

impl AssertionSpec {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.body_contains.is_none() && self.max_response_time.is_none()
    }
}

/// Parses "username:password" into a credential pair.
pub fn parse_basic_auth(s: &str) -> Result<(String, String), ConfigError> {
    match s.split_once(':') {
        Some((user, pass)) if !user.is_empty() => Ok((user.to_string(), pass.to_string())),
        _ => Err(ConfigError::MalformedAuth),
    }
}
