//! Per-worker request pacing.

use tokio::time::{self, Duration, Instant};

/// Open-loop pacer enforcing a minimum interval between dispatches.
///
/// Deadlines are absolute (`sleep_until`) rather than relative sleeps, which
/// eliminates accumulated truncation error and timer overshoot. When a
/// request runs longer than one interval the next dispatch fires immediately,
/// but the deadline is re-anchored to "now" so the worker never bursts above
/// its configured rate to catch up.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_fire: Instant,
}

impl Pacer {
    /// A pacer for `rate_limit` requests per second, or `None` when no rate
    /// limit is configured.
    pub fn new(rate_limit: Option<f64>) -> Option<Self> {
        let rate = rate_limit?;
        let interval = Duration::from_secs_f64(1.0 / rate);
        Some(Self {
            interval,
            next_fire: Instant::now() + interval,
        })
    }

    /// Sleeps until the next dispatch slot.
    pub async fn pace(&mut self) {
        time::sleep_until(self.next_fire).await;
        let now = Instant::now();
        // max() keeps the inter-dispatch gap at least one interval even after
        // an over-long request left the deadline in the past.
        self.next_fire = now.max(self.next_fire) + self.interval;
    }
}
