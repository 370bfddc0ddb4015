//! Worker loop: pull an id, pace, build, execute, evaluate, submit, ack.
//!
//! A worker produces exactly one result for every id it pulls, on every
//! outcome path (success, HTTP failure, assertion failure, cancellation), so
//! the dispatcher ledger always balances. Per-request failures never escape
//! into the worker's control flow; the only fatal condition is losing the
//! result collector.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assertions;
use crate::config::{AssertionSpec, TestConfig};
use crate::dispatcher::Dispatcher;
use crate::errors::{EngineError, ErrorKind, RequestError};
use crate::pace::Pacer;
use crate::payload::PayloadStore;
use crate::sink::{RequestResult, SinkHandle};

/// Everything a worker shares with the rest of the run.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<TestConfig>,
    pub assertions: Arc<AssertionSpec>,
    pub client: reqwest::Client,
    pub dispatcher: Arc<Dispatcher>,
    pub payloads: Arc<PayloadStore>,
    pub sink: SinkHandle,
    pub cancel: CancellationToken,
}

/// Runs one worker until the dispatcher signals stop or the run is cancelled.
pub async fn run_worker(worker_id: usize, ctx: WorkerContext) -> Result<(), EngineError> {
    debug!(worker_id, "worker starting");
    let mut pacer = Pacer::new(ctx.config.rate_limit);
    let url_count = ctx.config.urls.len() as u64;

    loop {
        let Some(id) = ctx.dispatcher.next() else {
            break;
        };

        // From here on the id is outstanding: every path below must submit
        // exactly one result and ack exactly once.
        if let Some(pacer) = pacer.as_mut() {
            tokio::select! {
                () = pacer.pace() => {}
                () = ctx.cancel.cancelled() => {
                    let url = ctx.config.urls[(id % url_count) as usize].clone();
                    let submitted = ctx.sink.submit(cancelled_result(&ctx, url, unix_now(), 0.0));
                    ctx.dispatcher.ack();
                    submitted?;
                    break;
                }
            }
        }

        let url = ctx.config.urls[(id % url_count) as usize].clone();
        let result = attempt(&ctx, url).await;
        let stop = result.error.as_ref().map(|e| e.kind) == Some(ErrorKind::Cancelled);

        let submitted = ctx.sink.submit(result);
        ctx.dispatcher.ack();
        submitted?;

        if stop {
            break;
        }
    }

    debug!(worker_id, "worker exiting");
    Ok(())
}

/// Issues one request and classifies the outcome.
async fn attempt(ctx: &WorkerContext, url: String) -> RequestResult {
    let timestamp = unix_now();
    let started = Instant::now();

    let request = match build_request(ctx, &url).await {
        Ok(request) => request,
        Err(error) => {
            return failure(ctx, url, timestamp, started.elapsed().as_secs_f64(), error)
        }
    };

    // `biased` polls the request first, so a response whose body finished
    // reading in the same tick as the cancellation still counts.
    tokio::select! {
        biased;
        outcome = execute(ctx, &url, request) => {
            let mut result = outcome;
            result.timestamp = timestamp;
            result
        }
        () = ctx.cancel.cancelled() => {
            debug!(url = %url, "request aborted by cancellation");
            cancelled_result(ctx, url.clone(), timestamp, started.elapsed().as_secs_f64())
        }
    }
}

/// Sends the request and reads the full body, measuring the monotonic delta
/// from dispatch to the last body byte.
async fn execute(ctx: &WorkerContext, url: &str, request: reqwest::RequestBuilder) -> RequestResult {
    let method = ctx.config.method.as_str().to_string();
    let started = Instant::now();

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return RequestResult {
                url: url.to_string(),
                method,
                status_code: 0,
                response_time: started.elapsed().as_secs_f64(),
                timestamp: 0.0,
                response_size: 0,
                error: Some(RequestError::from_reqwest(&e)),
            }
        }
    };

    let status = response.status().as_u16();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            return RequestResult {
                url: url.to_string(),
                method,
                status_code: 0,
                response_time: started.elapsed().as_secs_f64(),
                timestamp: 0.0,
                response_size: 0,
                error: Some(RequestError::from_reqwest(&e)),
            }
        }
    };
    let response_time = started.elapsed();

    let error = assertions::evaluate(&ctx.assertions, status, &body, response_time);

    debug!(
        url = %url,
        status_code = status,
        response_bytes = body.len(),
        response_ms = response_time.as_millis() as u64,
        "request completed"
    );

    RequestResult {
        url: url.to_string(),
        method,
        status_code: status,
        response_time: response_time.as_secs_f64(),
        timestamp: 0.0,
        response_size: body.len() as u64,
        error,
    }
}

/// Builds the request from the immutable config: headers, host override,
/// basic auth, and the body encoding (multipart form > raw body > body file).
async fn build_request(
    ctx: &WorkerContext,
    url: &str,
) -> Result<reqwest::RequestBuilder, RequestError> {
    let config = &ctx.config;
    let mut builder = ctx.client.request(config.method.into(), url);

    for (name, value) in &config.headers {
        builder = builder.header(name, value);
    }

    if let Some(host) = config.host.as_deref() {
        if !has_header(config, "host") {
            builder = builder.header("Host", host);
        }
    }

    if let Some((user, pass)) = &config.basic_auth {
        builder = builder.basic_auth(user, Some(pass));
    }

    if config.uses_form() {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &config.form {
            form = form.text(name.clone(), value.clone());
        }
        let parts = ctx.payloads.form_parts().await?;
        for part in parts.iter() {
            form = form.part(
                part.field.clone(),
                reqwest::multipart::Part::bytes(part.bytes.clone())
                    .file_name(part.file_name.clone()),
            );
        }
        builder = builder.multipart(form);
    } else if let Some(body) = &config.body {
        builder = apply_content_type(builder, config);
        builder = builder.body(body.clone());
    } else if let Some(loaded) = ctx.payloads.body().await {
        let text = loaded?;
        builder = apply_content_type(builder, config);
        builder = builder.body(text.as_str().to_string());
    }

    Ok(builder)
}

/// The configured content type backs a raw body unless the caller already
/// supplied an explicit Content-Type header.
fn apply_content_type(
    builder: reqwest::RequestBuilder,
    config: &TestConfig,
) -> reqwest::RequestBuilder {
    if has_header(config, "content-type") {
        builder
    } else {
        builder.header("Content-Type", &config.content_type)
    }
}

fn has_header(config: &TestConfig, name: &str) -> bool {
    config
        .headers
        .iter()
        .any(|(header, _)| header.eq_ignore_ascii_case(name))
}

fn cancelled_result(
    ctx: &WorkerContext,
    url: String,
    timestamp: f64,
    response_time: f64,
) -> RequestResult {
    info!(url = %url, "recording cancelled request");
    RequestResult {
        url,
        method: ctx.config.method.as_str().to_string(),
        status_code: 0,
        response_time,
        timestamp,
        response_size: 0,
        error: Some(RequestError::cancelled()),
    }
}

fn failure(
    ctx: &WorkerContext,
    url: String,
    timestamp: f64,
    response_time: f64,
    error: RequestError,
) -> RequestResult {
    RequestResult {
        url,
        method: ctx.config.method.as_str().to_string(),
        status_code: 0,
        response_time,
        timestamp,
        response_size: 0,
        error: Some(error),
    }
}

pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
