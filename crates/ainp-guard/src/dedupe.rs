//! # Content Dedupe
//!
//! Short-TTL cache of mail body hashes. A second delivery of an identical
//! body within the window is rejected; after the window the content may be
//! sent again (legitimate resends, digests).

use parking_lot::Mutex;
use std::collections::HashMap;

/// Body-hash dedupe cache for the email facet.
pub struct ContentDedupeCache {
    /// body hash (hex) -> expiry instant (Unix ms).
    entries: Mutex<HashMap<String, u64>>,
    ttl_ms: u64,
}

impl ContentDedupeCache {
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: ttl_secs * 1_000,
        }
    }

    /// Record a body hash; returns `true` when the content is fresh within
    /// the window.
    pub fn check_and_insert(&self, body_hash: &str, now_ms: u64) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|_, &mut expiry| expiry > now_ms);
        if entries.contains_key(body_hash) {
            return false;
        }
        entries.insert(body_hash.to_string(), now_ms + self.ttl_ms);
        true
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
