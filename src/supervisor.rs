//! Run orchestration.
//!
//! `LoadTest` owns one run: it spawns the worker population (all at once, or
//! growing per the ramp plan), arms the duration deadline, propagates
//! cancellation, waits for the drain, and reduces the sink into the final
//! `RunResult`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::build_client;
use crate::config::{AssertionSpec, RampPlan, Termination, TestConfig};
use crate::dispatcher::Dispatcher;
use crate::errors::{ConfigError, EngineError};
use crate::payload::PayloadStore;
use crate::sink::{spawn_collector, ProgressFn, RequestResult};
use crate::stats::Summary;
use crate::worker::{run_worker, unix_now, WorkerContext};

/// Extra time granted to workers to settle after cancellation, on top of the
/// per-request timeout.
const SETTLE_GRACE: Duration = Duration::from_secs(5);

/// Completed-run view handed back to the host.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResult {
    /// All per-request outcomes, in submit order.
    pub results: Vec<RequestResult>,

    /// Wall-clock unix timestamps bracketing the run.
    pub started_at: f64,
    pub ended_at: f64,

    /// Monotonic run duration in seconds.
    pub total_duration: f64,

    pub summary: Summary,
}

/// Cancellation handle for a run, safe to share with signal handlers.
#[derive(Clone)]
pub struct RunHandle {
    cancel: CancellationToken,
}

impl RunHandle {
    /// Aborts the run: workers stop at their next suspension point and
    /// in-flight requests are aborted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One configured load-test run.
pub struct LoadTest {
    config: Arc<TestConfig>,
    ramp: Option<RampPlan>,
    assertions: Arc<AssertionSpec>,
    progress: Option<ProgressFn>,
    cancel: CancellationToken,
}

impl LoadTest {
    /// Validates the config and prepares a run.
    pub fn new(config: TestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            ramp: None,
            assertions: Arc::new(AssertionSpec::default()),
            progress: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Enables ramp-up per the given plan.
    pub fn with_ramp(mut self, ramp: RampPlan) -> Result<Self, ConfigError> {
        ramp.validate(self.config.concurrency)?;
        self.ramp = Some(ramp);
        Ok(self)
    }

    /// Applies post-response assertions to every request.
    pub fn with_assertions(mut self, assertions: AssertionSpec) -> Self {
        self.assertions = Arc::new(assertions);
        self
    }

    /// Registers a progress observer invoked on each submitted result.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// A handle that can cancel this run from elsewhere (signal handler,
    /// deadline owned by the host, ...).
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Executes the run to completion and reduces it to a `RunResult`.
    pub async fn run(self) -> Result<RunResult, EngineError> {
        let config = Arc::clone(&self.config);
        let termination = config.termination();

        let started_at = unix_now();
        let started = Instant::now();

        let limit = match termination {
            Termination::Count(n) => Some(n),
            Termination::Deadline(_) => None,
        };
        let dispatcher = Arc::new(Dispatcher::new(limit, self.cancel.clone()));
        let (sink, collector) = spawn_collector(self.progress.clone());
        let client = build_client(&config, sink.clone())?;
        let payloads = Arc::new(PayloadStore::new(&config));

        let ctx = WorkerContext {
            config: Arc::clone(&config),
            assertions: Arc::clone(&self.assertions),
            client,
            dispatcher: Arc::clone(&dispatcher),
            payloads,
            sink,
            cancel: self.cancel.clone(),
        };

        info!(
            urls = config.urls.len(),
            concurrency = config.concurrency,
            termination = ?termination,
            ramp = self.ramp.is_some(),
            "starting run"
        );

        if let Termination::Deadline(duration) = termination {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {
                        info!(duration_secs = duration.as_secs_f64(), "duration reached, cancelling workers");
                        cancel.cancel();
                    }
                    () = cancel.cancelled() => {}
                }
            });
        }

        // Worker handles flow through a channel so ramp-spawned workers are
        // joined the same way as the initial population.
        let (handle_tx, mut handle_rx) = mpsc::unbounded_channel::<JoinHandle<Result<(), EngineError>>>();

        let initial = self.ramp.as_ref().map_or(config.concurrency, |p| p.initial);
        for worker_id in 0..initial {
            let _ = handle_tx.send(tokio::spawn(run_worker(worker_id, ctx.clone())));
        }

        if let Some(plan) = self.ramp.clone() {
            let ctx = ctx.clone();
            let handle_tx = handle_tx.clone();
            tokio::spawn(ramp_controller(plan, ctx, handle_tx));
        }
        drop(handle_tx);

        let join_workers = async {
            let mut worker_error: Option<EngineError> = None;
            while let Some(handle) = handle_rx.recv().await {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(error = %e, "worker reported fatal error");
                        worker_error.get_or_insert(e);
                    }
                    Err(join_error) => {
                        error!(error = %join_error, "worker task failed");
                        worker_error.get_or_insert(EngineError::Worker(join_error.to_string()));
                    }
                }
            }
            worker_error
        };

        let settle_deadline = {
            let cancel = self.cancel.clone();
            let budget = config.timeout + SETTLE_GRACE;
            async move {
                cancel.cancelled().await;
                tokio::time::sleep(budget).await;
            }
        };

        let worker_error = tokio::select! {
            worker_error = join_workers => worker_error,
            () = settle_deadline => {
                warn!("workers did not settle within the grace period after cancellation");
                return Err(EngineError::Worker(
                    "workers did not settle after cancellation".to_string(),
                ));
            }
        };

        // All workers exited: the ledger can no longer grow, so this proves
        // every issued id was acknowledged with exactly one result.
        dispatcher.drain().await;

        let ended_at = unix_now();
        let total_duration = started.elapsed().as_secs_f64();

        // Dropping the context releases the client (whose timing hooks hold
        // sink handles); the collector then sees the channel close and
        // returns the completed store.
        drop(ctx);
        let sink = collector.await.map_err(|_| EngineError::SinkClosed)?;

        if let Some(error) = worker_error {
            return Err(error);
        }

        let issued = dispatcher.issued();
        if sink.results.len() as u64 != issued {
            return Err(EngineError::Worker(format!(
                "result count {} does not match issued work ids {}",
                sink.results.len(),
                issued
            )));
        }

        let summary = Summary::compute(&sink, total_duration);
        info!(
            total = summary.total_requests,
            successful = summary.successful_requests,
            failed = summary.failed_requests,
            rps = summary.requests_per_second,
            "run complete"
        );

        Ok(RunResult {
            results: sink.results,
            started_at,
            ended_at,
            total_duration,
            summary,
        })
    }
}

/// Grows the worker population by `increment` every `interval` until `max`
/// workers are active, the run is cancelled, or the work is exhausted.
async fn ramp_controller(
    plan: RampPlan,
    ctx: WorkerContext,
    handle_tx: mpsc::UnboundedSender<JoinHandle<Result<(), EngineError>>>,
) {
    let mut current = plan.initial;
    while current < plan.max {
        tokio::select! {
            () = tokio::time::sleep(plan.interval) => {}
            () = ctx.cancel.cancelled() => break,
        }
        if ctx.dispatcher.is_exhausted() {
            break;
        }
        let add = plan.increment.min(plan.max - current);
        for offset in 0..add {
            if handle_tx
                .send(tokio::spawn(run_worker(current + offset, ctx.clone())))
                .is_err()
            {
                return;
            }
        }
        current += add;
        info!(active_workers = current, max = plan.max, "ramp step");
    }
}
