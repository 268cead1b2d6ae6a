//! Observability sink the access layers report to.
//!
//! Every layer logs through `tracing` on its own; an [`AccessObserver`] is the
//! additional write-only channel for counters and tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::access::TxState;
use crate::types::{AccessError, Query};

/// Whether a cache lookup was served from memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CacheOutcome {
    /// Rows were returned from the cache.
    Hit,
    /// Rows had to be computed.
    Miss,
}

/// Receiver for events emitted by the access layers. All methods default to
/// doing nothing.
pub trait AccessObserver: Send + Sync {
    /// A statement is about to run.
    fn query_started(&self, _query: &Query) {}

    /// Attempt `attempt` of `max_attempts` failed with `error`.
    fn attempt_failed(&self, _attempt: u32, _max_attempts: u32, _error: &AccessError) {}

    /// A cache lookup for `query` completed.
    fn cache_lookup(&self, _query: &Query, _outcome: CacheOutcome) {}

    /// A transaction reached a terminal state.
    fn transaction_finished(&self, _state: TxState) {}
}

/// Observer that ignores every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl AccessObserver for NoopObserver {}

pub(crate) static NOOP: NoopObserver = NoopObserver;

/// Lock-free counters over access events.
#[derive(Debug, Default)]
pub struct AccessMetrics {
    queries: AtomicU64,
    failed_attempts: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl AccessMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.queries,
            &self.failed_attempts,
            &self.cache_hits,
            &self.cache_misses,
            &self.commits,
            &self.rollbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl AccessObserver for AccessMetrics {
    fn query_started(&self, _query: &Query) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    fn attempt_failed(&self, _attempt: u32, _max_attempts: u32, _error: &AccessError) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_lookup(&self, _query: &Query, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Hit => self.cache_hits.fetch_add(1, Ordering::Relaxed),
            CacheOutcome::Miss => self.cache_misses.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn transaction_finished(&self, state: TxState) {
        match state {
            TxState::Committed => {
                self.commits.fetch_add(1, Ordering::Relaxed);
            }
            TxState::RolledBack => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
            }
            TxState::Active => {}
        }
    }
}

/// Point-in-time copy of [`AccessMetrics`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MetricsSnapshot {
    /// Statements started.
    pub queries: u64,
    /// Failed attempts reported by the retry layer.
    pub failed_attempts: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Committed transactions.
    pub commits: u64,
    /// Rolled back transactions.
    pub rollbacks: u64,
}

impl MetricsSnapshot {
    /// Fraction of cache lookups served from memory.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Access Metrics ===")?;
        writeln!(f, "Queries:          {}", self.queries)?;
        writeln!(f, "Failed Attempts:  {}", self.failed_attempts)?;
        writeln!(f, "Cache Hits:       {}", self.cache_hits)?;
        writeln!(f, "Cache Misses:     {}", self.cache_misses)?;
        writeln!(f, "Cache Hit Rate:   {:.2}%", self.cache_hit_rate() * 100.0)?;
        writeln!(f, "Commits:          {}", self.commits)?;
        write!(f, "Rollbacks:        {}", self.rollbacks)
    }
}
