//! Volume based throttling.
//!
//! The remote service limits unauthenticated traffic by request volume, not
//! by wall-clock rate. Volume is approximated by the size of the discovered
//! graph: every `batch.size - concurrency * 25` users is one phase, each new
//! phase costs a batch pause, and after `batch.count` phases the crawler
//! waits out a daily reset. The formula is an empirical heuristic, not a
//! documented service contract.
//!
//! Phases count from the graph size at the last daily reset, so the phase is
//! `floor((graph_size - baseline) / (batch.size - concurrency * 25))` rather
//! than the plain `floor(graph_size / ...)`. With the plain form every phase
//! after the first reset would already be past `batch.count` and each new
//! phase would trigger another daily pause.

use crate::client::FOLLOWER_PAGE_SIZE;
use crate::limits::RateLimits;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Phase counter carried between limiter calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatePhase {
    pub phase: usize,
    /// Graph size at the last daily reset. Growth before it is already paid
    /// for.
    pub baseline: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    Batch(Duration),
    Daily(Duration),
}

impl RateLimit {
    pub fn delay(&self) -> Duration {
        match self {
            RateLimit::Batch(delay) | RateLimit::Daily(delay) => *delay,
        }
    }
}

/// Largest concurrency that keeps the phase denominator positive.
pub fn max_concurrency(batch_size: usize) -> usize {
    (batch_size.saturating_sub(1) / FOLLOWER_PAGE_SIZE).max(1)
}

/// `floor(graph_size / (batch_size - concurrency * 25))`
pub fn phase_of(graph_size: usize, concurrency: usize, batch_size: usize) -> usize {
    let denominator = batch_size
        .saturating_sub(concurrency.saturating_mul(FOLLOWER_PAGE_SIZE))
        .max(1);
    graph_size / denominator
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: RateLimits,
    concurrency: usize,
}

impl RateLimiter {
    pub fn new(limits: &RateLimits, concurrency: usize) -> Self {
        Self {
            limits: limits.clone(),
            concurrency,
        }
    }

    pub fn assess(&self, state: RatePhase, graph_size: usize) -> (RatePhase, Option<RateLimit>) {
        self.assess_with(state, graph_size, &mut fastrand::Rng::new())
    }

    /// Decide whether the graph has grown into a new phase. Daily limits
    /// reset the phase, batch limits keep it.
    pub fn assess_with(
        &self,
        state: RatePhase,
        graph_size: usize,
        rng: &mut fastrand::Rng,
    ) -> (RatePhase, Option<RateLimit>) {
        let phase = phase_of(
            graph_size.saturating_sub(state.baseline),
            self.concurrency,
            self.limits.batch.size,
        );

        if phase <= state.phase {
            return (state, None);
        }

        if phase >= self.limits.batch.count {
            let next = RatePhase {
                phase: 0,
                baseline: graph_size,
            };
            return (next, Some(RateLimit::Daily(self.limits.delay.daily.sample_with(rng))));
        }

        let next = RatePhase { phase, ..state };
        (next, Some(RateLimit::Batch(self.limits.delay.batches.sample_with(rng))))
    }

    /// Short pause taken after every page.
    pub fn page_delay(&self) -> Duration {
        self.limits.delay.pages.sample()
    }

    /// Wait out an assessed limit. Returns `false` when cancelled first.
    pub async fn apply(&self, limit: RateLimit, cancel: &CancellationToken) -> bool {
        pause(limit.delay(), cancel).await
    }
}

/// Sleep unless cancelled first. Returns `false` when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}
