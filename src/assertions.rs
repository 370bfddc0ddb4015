//! Post-response assertion evaluation.
//!
//! Assertions reclassify an otherwise-successful response as a typed failure.
//! The response's real status code stays on record either way.

use std::time::Duration;

use crate::config::AssertionSpec;
use crate::errors::{ErrorKind, RequestError};

/// Applies the assertion spec to a completed response.
///
/// Checks run in a fixed order (status, body substring, max response time)
/// and a later failure replaces an earlier one, so the reported error is the
/// last check that failed.
pub fn evaluate(
    spec: &AssertionSpec,
    status: u16,
    body: &[u8],
    response_time: Duration,
) -> Option<RequestError> {
    let mut failure = None;

    if let Some(expected) = spec.status {
        if status != expected {
            failure = Some(RequestError::new(
                ErrorKind::AssertStatus,
                format!("expected status {}, got {}", expected, status),
            ));
        }
    }

    if let Some(needle) = spec.body_contains.as_deref() {
        failure = check_body_contains(needle, body).or(failure);
    }

    if let Some(max_rt) = spec.max_response_time {
        if response_time > max_rt {
            failure = Some(RequestError::new(
                ErrorKind::AssertMaxRt,
                format!(
                    "response time {:.3}s exceeded limit {:.3}s",
                    response_time.as_secs_f64(),
                    max_rt.as_secs_f64()
                ),
            ));
        }
    }

    failure
}

/// Substring check with lenient decoding: invalid bytes are replaced rather
/// than failing the decode outright, and only an undecodable miss is
/// reported as a decode problem.
fn check_body_contains(needle: &str, body: &[u8]) -> Option<RequestError> {
    match std::str::from_utf8(body) {
        Ok(text) if text.contains(needle) => None,
        Ok(_) => Some(RequestError::new(
            ErrorKind::AssertBody,
            format!("body does not contain '{}'", needle),
        )),
        Err(_) => {
            let lossy = String::from_utf8_lossy(body);
            if lossy.contains(needle) {
                None
            } else {
                Some(RequestError::new(
                    ErrorKind::Decode,
                    format!("body does not contain '{}' (invalid utf-8 in body)", needle),
                ))
            }
        }
    }
}
