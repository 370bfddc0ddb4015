//! Operator entry point.
//!
//! Configuration comes from environment variables so the binary slots into
//! containers and CI jobs without an argument-parsing layer. The engine is
//! host-agnostic; everything here is translation and presentation.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stampede::utils::{parse_duration_string, parse_pair_list};
use stampede::{
    config::parse_basic_auth, export, AssertionSpec, LoadTest, Method, ProgressFn, RampPlan,
    TestConfig,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = config_from_env()?;
    let ramp = ramp_from_env(&config)?;
    let assertions = assertions_from_env()?;

    info!(
        urls = ?config.urls,
        method = %config.method,
        concurrency = config.concurrency,
        num_requests = config.num_requests,
        duration = ?config.duration,
        rate_limit = ?config.rate_limit,
        "starting load test"
    );

    let mut test = LoadTest::new(config)?;
    if let Some(plan) = ramp {
        test = test.with_ramp(plan)?;
    }
    if !assertions.is_empty() {
        test = test.with_assertions(assertions);
    }
    if std::io::stderr().is_terminal() {
        test = test.with_progress(progress_printer());
    }

    // Ctrl-C aborts the run but still produces a summary for what completed.
    let handle = test.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let run = test.run().await?;

    if std::io::stderr().is_terminal() {
        eprintln!();
    }
    println!("{}", export::render_summary(&run.summary));

    match env::var("OUTPUT").ok().as_deref() {
        Some("csv") => {
            let path = output_path("csv");
            export::write_csv_file(&run.results, &path)?;
            info!(path = %path.display(), "results exported");
        }
        Some("json") => {
            let path = output_path("json");
            std::fs::write(&path, export::to_json(&run)?)?;
            info!(path = %path.display(), "results exported");
        }
        Some(other) => warn!(output = other, "unknown OUTPUT format, skipping export"),
        None => {}
    }

    Ok(())
}

fn progress_printer() -> ProgressFn {
    Arc::new(|count| {
        eprint!("\rcompleted: {count}");
    })
}

fn output_path(extension: &str) -> PathBuf {
    env::var("OUTPUT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(format!("stampede-results.{extension}")))
}

/// Builds the run config from environment variables.
fn config_from_env() -> Result<TestConfig, Box<dyn std::error::Error + Send + Sync>> {
    let urls: Vec<String> = env::var("TARGET_URLS")
        .or_else(|_| env::var("TARGET_URL"))
        .map_err(|_| "TARGET_URLS environment variable must be set")?
        .split(',')
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    let mut config = TestConfig::new(urls);

    if let Some(method) = env_string("METHOD") {
        config.method = Method::from_str(&method)?;
    }
    if let Some(n) = env_string("NUM_REQUESTS") {
        config.num_requests = n.parse().map_err(|_| "NUM_REQUESTS must be a number")?;
    }
    if let Some(c) = env_string("CONCURRENCY") {
        config.concurrency = c.parse().map_err(|_| "CONCURRENCY must be a number")?;
    }
    if let Some(rate) = env_string("RATE_LIMIT") {
        config.rate_limit = Some(rate.parse().map_err(|_| "RATE_LIMIT must be a number")?);
    }
    if let Some(duration) = env_string("DURATION") {
        config.duration = Some(parse_duration_string(&duration)?);
    }
    if let Some(timeout) = env_string("TIMEOUT_SECS") {
        let secs: f64 = timeout.parse().map_err(|_| "TIMEOUT_SECS must be a number")?;
        config.timeout = std::time::Duration::from_secs_f64(secs);
    }
    if let Some(headers) = env_string("HEADERS") {
        config.headers.extend(parse_pair_list(&headers, ':')?);
    }
    config.body = env_string("BODY");
    config.body_file = env_string("BODY_FILE").map(PathBuf::from);
    if let Some(content_type) = env_string("CONTENT_TYPE") {
        config.content_type = content_type;
    }
    if let Some(auth) = env_string("BASIC_AUTH") {
        config.basic_auth = Some(parse_basic_auth(&auth)?);
    }
    config.proxy = env_string("PROXY");
    config.http2 = env_flag("HTTP2");
    config.host = env_string("HOST_HEADER");
    config.disable_compression = env_flag("DISABLE_COMPRESSION");
    config.disable_keepalive = env_flag("DISABLE_KEEPALIVE");
    config.disable_redirects = env_flag("DISABLE_REDIRECTS");

    if let Some(fields) = env_string("FORM") {
        config.form.extend(parse_pair_list(&fields, '=')?);
    }
    if let Some(files) = env_string("FORM_FILES") {
        for (name, path) in parse_pair_list(&files, '=')? {
            config.form_files.push((name, PathBuf::from(path)));
        }
    }

    Ok(config)
}

fn ramp_from_env(config: &TestConfig) -> Result<Option<RampPlan>, Box<dyn std::error::Error + Send + Sync>> {
    if !env_flag("STEP_LOAD") {
        return Ok(None);
    }

    let mut plan = RampPlan {
        initial: 1,
        max: config.concurrency,
        interval: std::time::Duration::from_secs(10),
        increment: 1,
    };
    if let Some(initial) = env_string("STEP_INITIAL") {
        plan.initial = initial.parse().map_err(|_| "STEP_INITIAL must be a number")?;
    }
    if let Some(max) = env_string("STEP_MAX") {
        plan.max = max.parse().map_err(|_| "STEP_MAX must be a number")?;
    }
    if let Some(interval) = env_string("STEP_INTERVAL") {
        plan.interval = parse_duration_string(&interval)?;
    }
    if let Some(increment) = env_string("STEP_INCREMENT") {
        plan.increment = increment
            .parse()
            .map_err(|_| "STEP_INCREMENT must be a number")?;
    }

    Ok(Some(plan))
}

fn assertions_from_env() -> Result<AssertionSpec, Box<dyn std::error::Error + Send + Sync>> {
    let mut spec = AssertionSpec::default();
    if let Some(status) = env_string("ASSERT_STATUS") {
        spec.status = Some(status.parse().map_err(|_| "ASSERT_STATUS must be a status code")?);
    }
    spec.body_contains = env_string("ASSERT_BODY_CONTAINS");
    if let Some(max_rt) = env_string("ASSERT_MAX_RT") {
        let secs: f64 = max_rt.parse().map_err(|_| "ASSERT_MAX_RT must be seconds")?;
        spec.max_response_time = Some(std::time::Duration::from_secs_f64(secs));
    }
    Ok(spec)
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
