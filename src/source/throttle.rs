//! Cooperative sleep gate for bursts of source requests
//!
//! Callers thread a counter through [`RateGate::sleep_gate`] after each
//! request. The first `calls_before_backoff` calls pass; the next one sleeps
//! for a random number of seconds and the counter restarts at zero. Only the
//! calling task is delayed; other workers keep their own counters.

use crate::config::RedditConfig;
use rand::Rng;
use std::time::Duration;

/// Burst counter with randomized backoff
#[derive(Debug, Clone, Copy)]
pub struct RateGate {
    calls_before_backoff: u32,
    min_secs: u64,
    max_secs: u64,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(23, 75, 445)
    }
}

impl RateGate {
    /// `min_secs` is inclusive, `max_secs` exclusive
    pub fn new(calls_before_backoff: u32, min_secs: u64, max_secs: u64) -> Self {
        Self {
            calls_before_backoff,
            min_secs,
            max_secs: max_secs.max(min_secs + 1),
        }
    }

    pub fn from_config(config: &RedditConfig) -> Self {
        Self::new(
            config.calls_before_backoff,
            config.backoff_min_secs,
            config.backoff_max_secs,
        )
    }

    /// Next counter value and whether the caller must sleep first
    pub fn advance(&self, count: u32) -> (u32, bool) {
        let next = count.saturating_add(1);
        if next > self.calls_before_backoff {
            (0, true)
        } else {
            (next, false)
        }
    }

    fn backoff(&self) -> Duration {
        Duration::from_secs(rand::thread_rng().gen_range(self.min_secs..self.max_secs))
    }

    /// Count one request, sleeping when the burst is exhausted
    pub async fn sleep_gate(&self, count: u32) -> u32 {
        let (next, must_sleep) = self.advance(count);
        if must_sleep {
            let delay = self.backoff();
            tracing::info!(seconds = delay.as_secs(), "Sleeping to stay under the rate limit");
            crate::metrics::record_gate_sleep(delay);
            tokio::time::sleep(delay).await;
        }
        next
    }
}
