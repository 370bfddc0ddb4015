//! Shared HTTP client construction.
//!
//! One pooled client serves every worker. Connection-phase latencies are
//! sampled through two hooks: a wrapping DNS resolver that times each fresh
//! resolution, and a connector layer that times each fresh connection
//! establishment. Pooled connection reuse bypasses both hooks, so sampling is
//! best-effort by design.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::debug;

use crate::config::TestConfig;
use crate::sink::SinkHandle;

/// Idle pooled connections are kept alive this long unless keep-alive is
/// disabled outright.
const KEEPALIVE_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the run's shared client from the immutable config.
pub fn build_client(config: &TestConfig, samples: SinkHandle) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(KEEPALIVE_IDLE_TIMEOUT)
        .pool_max_idle_per_host(config.concurrency)
        .dns_resolver(Arc::new(TimingResolver::new(samples.clone())))
        .connector_layer(TimingConnectorLayer::new(samples));

    if config.disable_keepalive {
        builder = builder.pool_max_idle_per_host(0);
    }

    if config.disable_compression {
        builder = builder.no_gzip().no_brotli().no_deflate();
    }

    if config.disable_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    if !config.http2 {
        // HTTP/2 is opt-in; without the flag the client never negotiates h2.
        builder = builder.http1_only();
    }

    if let Some(proxy) = config.proxy.as_deref() {
        let proxy_url = if proxy.contains("://") {
            proxy.to_string()
        } else {
            format!("http://{proxy}")
        };
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// DNS resolver that reports the duration of every fresh resolution.
struct TimingResolver {
    samples: SinkHandle,
}

impl TimingResolver {
    fn new(samples: SinkHandle) -> Self {
        Self { samples }
    }
}

impl Resolve for TimingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let samples = self.samples.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let started = Instant::now();
            // Port 0 is a placeholder; the connector substitutes the real
            // port from the URL after resolution.
            let resolved: Vec<_> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
            let elapsed = started.elapsed();
            debug!(host = %host, addrs = resolved.len(), elapsed_us = elapsed.as_micros() as u64, "resolved host");
            samples.record_dns(elapsed);
            let addrs: Addrs = Box::new(resolved.into_iter());
            Ok(addrs)
        })
    }
}

/// Connector layer that reports the duration of every successful fresh
/// connection establishment (TCP connect plus TLS handshake when present).
#[derive(Clone)]
struct TimingConnectorLayer {
    samples: SinkHandle,
}

impl TimingConnectorLayer {
    fn new(samples: SinkHandle) -> Self {
        Self { samples }
    }
}

impl<S> Layer<S> for TimingConnectorLayer {
    type Service = TimingConnector<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimingConnector {
            inner,
            samples: self.samples.clone(),
        }
    }
}

#[derive(Clone)]
struct TimingConnector<S> {
    inner: S,
    samples: SinkHandle,
}

impl<S, Request> Service<Request> for TimingConnector<S>
where
    S: Service<Request>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let started = Instant::now();
        let samples = self.samples.clone();
        let connecting = self.inner.call(request);
        Box::pin(async move {
            let connection = connecting.await;
            if connection.is_ok() {
                samples.record_connect(started.elapsed());
            }
            connection
        })
    }
}
