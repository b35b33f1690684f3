//! # Replay Cache
//!
//! Time-bounded cache of envelope ids. An id is retained until well past
//! its envelope's deadline, so a replayed envelope can never slip in while
//! the original is still routable. Expired entries are garbage-collected
//! on access.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Replay cache keyed by envelope id.
pub struct ReplayCache {
    /// id -> retain-until instant (Unix ms).
    seen: Mutex<HashMap<String, u64>>,
    /// Extra retention beyond the envelope deadline.
    grace_ms: u64,
    /// GC cadence.
    gc_interval_ms: u64,
    last_gc: Mutex<u64>,
}

impl ReplayCache {
    /// Retain ids for one envelope-TTL beyond their deadline by default.
    pub const DEFAULT_GRACE_MS: u64 = 300_000;

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL_MS: u64 = 10_000;

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_GRACE_MS, Self::DEFAULT_GC_INTERVAL_MS)
    }

    #[must_use]
    pub fn with_config(grace_ms: u64, gc_interval_ms: u64) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            grace_ms,
            gc_interval_ms,
            last_gc: Mutex::new(0),
        }
    }

    /// Check the id and record it.
    ///
    /// Returns `true` when the id is fresh. `expires_at_ms` is the
    /// envelope's deadline; the entry is retained past it by the grace
    /// window.
    pub fn check_and_insert(&self, envelope_id: &str, expires_at_ms: u64, now_ms: u64) -> bool {
        self.maybe_gc(now_ms);

        let mut seen = self.seen.lock();
        if seen.contains_key(envelope_id) {
            return false;
        }
        seen.insert(
            envelope_id.to_string(),
            expires_at_ms.saturating_add(self.grace_ms),
        );
        true
    }

    /// Whether an id is currently cached.
    #[must_use]
    pub fn contains(&self, envelope_id: &str) -> bool {
        self.seen.lock().contains_key(envelope_id)
    }

    /// Number of cached ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    fn maybe_gc(&self, now_ms: u64) {
        let mut last = self.last_gc.lock();
        if now_ms.saturating_sub(*last) < self.gc_interval_ms {
            return;
        }
        *last = now_ms;
        drop(last);
        self.seen.lock().retain(|_, &mut until| until > now_ms);
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_id_accepted() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("E1", 10_000, 1_000));
        assert!(cache.contains("E1"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("E1", 10_000, 1_000));
        assert!(!cache.check_and_insert("E1", 10_000, 1_500));
    }

    #[test]
    fn test_gc_evicts_past_grace() {
        let cache = ReplayCache::with_config(1_000, 10);
        cache.check_and_insert("E1", 2_000, 1_000);
        // deadline 2_000 + grace 1_000 = retained until 3_000
        cache.check_and_insert("other", 100_000, 2_500);
        assert!(cache.contains("E1"));
        cache.check_and_insert("another", 100_000, 3_500);
        assert!(!cache.contains("E1"));
    }

    #[test]
    fn test_distinct_ids_independent() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert("E1", 10_000, 1_000));
        assert!(cache.check_and_insert("E2", 10_000, 1_000));
        assert_eq!(cache.len(), 2);
    }
}
