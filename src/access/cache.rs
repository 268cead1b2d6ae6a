use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::observe::{AccessObserver, CacheOutcome};
use crate::types::{Query, Result, Row};

/// Hit and miss counters for a [`ResultCache`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Lookups served from memory.
    pub hits: u64,
    /// Lookups that ran the computation.
    pub misses: u64,
    /// Entries currently held.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that were hits.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memoizes query results by `(sql, parameters)`.
///
/// Entries never expire on their own; callers that write to the underlying
/// tables use [`invalidate`](Self::invalidate) or [`flush`](Self::flush). A
/// cache built [`with_capacity`](Self::with_capacity) evicts the least
/// recently used entry once full. Failed computations are never stored.
///
/// The lock is not held while a result is computed, so two threads missing on
/// the same key may both run the query; the first result stored wins and both
/// callers receive it.
pub struct ResultCache {
    entries: Mutex<LruCache<Query, Arc<Vec<Row>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    /// Creates an unbounded cache.
    pub fn new() -> Self {
        Self::from_lru(LruCache::unbounded())
    }

    /// Creates a cache holding at most `capacity` results.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self::from_lru(LruCache::new(capacity))
    }

    fn from_lru(entries: LruCache<Query, Arc<Vec<Row>>>) -> Self {
        Self {
            entries: Mutex::new(entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached rows for `query`, or runs `compute` and stores its
    /// result.
    ///
    /// `compute` runs at most once per call and never while a hit exists. Its
    /// error is returned as-is and leaves the cache untouched.
    pub fn get_or_compute<F>(
        &self,
        query: &Query,
        observer: &dyn AccessObserver,
        compute: F,
    ) -> Result<Arc<Vec<Row>>>
    where
        F: FnOnce() -> Result<Vec<Row>>,
    {
        let cached = self.entries.lock().get(query).cloned();
        if let Some(rows) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            observer.cache_lookup(query, CacheOutcome::Hit);
            debug!(sql = query.sql(), "cache hit");
            return Ok(rows);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        observer.cache_lookup(query, CacheOutcome::Miss);
        debug!(sql = query.sql(), "cache miss");

        let rows = Arc::new(compute()?);
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(query) {
            return Ok(Arc::clone(existing));
        }
        entries.put(query.clone(), Arc::clone(&rows));
        Ok(rows)
    }

    /// Returns the cached rows for `query` without computing.
    pub fn get(&self, query: &Query) -> Option<Arc<Vec<Row>>> {
        self.entries.lock().get(query).cloned()
    }

    /// Removes the entry for `query`. Returns whether one was present.
    pub fn invalidate(&self, query: &Query) -> bool {
        self.entries.lock().pop(query).is_some()
    }

    /// Drops every entry. Counters are kept.
    pub fn flush(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "result cache flushed");
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
