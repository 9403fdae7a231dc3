//! Auto-cache Statistics
//!
//! Lock-free counters for what the read path and the background jobs did.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of an auto-cache's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable in the store
    pub misses: u64,
    /// Lookups where a hook chose to skip the cached value
    pub ignored: u64,
    /// Cached values evicted on read (stale generation, too old, or by strategy)
    pub removed: u64,
    /// Background jobs launched
    pub background_started: u64,
    /// Background jobs not launched because the same key was already busy
    pub background_skipped: u64,
}

impl AutoCacheStats {
    /// Returns hits / all lookups, or 0.0 if nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.ignored + self.removed;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    ignored: AtomicU64,
    removed: AtomicU64,
    background_started: AtomicU64,
    background_skipped: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_started(&self) {
        self.background_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_skipped(&self) {
        self.background_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AutoCacheStats {
        AutoCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            background_started: self.background_started.load(Ordering::Relaxed),
            background_skipped: self.background_skipped.load(Ordering::Relaxed),
        }
    }
}
