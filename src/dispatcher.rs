//! Work-id dispatch and completion accounting.
//!
//! The dispatcher hands out unique request ids `0..N` (or without bound for
//! duration-capped runs, where the cancellation signal ends issuance) and
//! keeps an issued/acknowledged ledger so the supervisor can prove the run
//! drained: every id that was handed to a worker produced exactly one result.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub struct Dispatcher {
    /// `Some(n)` for count-terminated runs; `None` issues ids until cancelled.
    limit: Option<u64>,
    next_id: AtomicU64,
    issued: AtomicU64,
    acked: AtomicU64,
    cancel: CancellationToken,
    drained: Notify,
}

impl Dispatcher {
    pub fn new(limit: Option<u64>, cancel: CancellationToken) -> Self {
        Self {
            limit,
            next_id: AtomicU64::new(0),
            issued: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            cancel,
            drained: Notify::new(),
        }
    }

    /// Pulls the next work id. `None` is the stop marker: the sequence is
    /// exhausted or the run was cancelled. Concurrent pullers receive
    /// disjoint ids with no ordering guarantee between workers.
    pub fn next(&self) -> Option<u64> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if id >= limit {
                return None;
            }
        }
        self.issued.fetch_add(1, Ordering::AcqRel);
        Some(id)
    }

    /// Acknowledges one pulled id as complete. Must be called exactly once
    /// per id returned by `next`, on every outcome path.
    pub fn ack(&self) {
        self.acked.fetch_add(1, Ordering::AcqRel);
        self.drained.notify_waiters();
    }

    /// True once a finite sequence has been fully handed out. Unbounded
    /// dispatchers never exhaust; they end by cancellation.
    pub fn is_exhausted(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.next_id.load(Ordering::Relaxed) >= limit)
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Acquire)
    }

    /// Waits until every issued id has been acknowledged. Call only after
    /// all workers have exited, so the issued count can no longer grow.
    pub async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            if self.acked() >= self.issued() {
                return;
            }
            notified.await;
        }
    }
}
