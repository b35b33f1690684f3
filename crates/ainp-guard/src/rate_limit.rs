//! # Sliding-Window Rate Limiter
//!
//! Per-key sliding window over request timestamps. When the backing store
//! is marked unavailable the limiter fails open and the caller marks the
//! response degraded.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Allowed because the store is down; response must carry `degraded`.
    AllowedDegraded,
    Limited { retry_after_secs: u64 },
}

/// Sliding window of N requests per window W, keyed by agent identifier.
pub struct SlidingWindowRateLimiter {
    windows: Mutex<HashMap<String, VecDeque<u64>>>,
    window_ms: u64,
    max_requests: u32,
    available: AtomicBool,
}

impl SlidingWindowRateLimiter {
    #[must_use]
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window_ms,
            max_requests,
            available: AtomicBool::new(true),
        }
    }

    /// Record a request attempt for `key` and decide.
    pub fn check(&self, key: &str, now_ms: u64) -> RateDecision {
        if !self.available.load(Ordering::Relaxed) {
            return RateDecision::AllowedDegraded;
        }

        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_default();
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }
        if window.len() >= self.max_requests as usize {
            let oldest = window.front().copied().unwrap_or(now_ms);
            let retry_ms = (oldest + self.window_ms).saturating_sub(now_ms);
            return RateDecision::Limited {
                retry_after_secs: retry_ms.div_ceil(1_000).max(1),
            };
        }
        window.push_back(now_ms);
        RateDecision::Allowed
    }

    /// Requests currently counted for a key.
    #[must_use]
    pub fn current(&self, key: &str) -> usize {
        self.windows.lock().get(key).map_or(0, VecDeque::len)
    }

    /// Mark the backing store up or down (fail-open).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_within_limit() {
        let limiter = SlidingWindowRateLimiter::new(60_000, 3);
        for _ in 0..3 {
            assert_eq!(limiter.check("did:key:zA", 1_000), RateDecision::Allowed);
        }
    }

    #[test]
    fn test_limits_over_max() {
        let limiter = SlidingWindowRateLimiter::new(60_000, 2);
        limiter.check("did:key:zA", 1_000);
        limiter.check("did:key:zA", 2_000);
        let decision = limiter.check("did:key:zA", 3_000);
        assert!(matches!(decision, RateDecision::Limited { .. }));
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowRateLimiter::new(10_000, 1);
        assert_eq!(limiter.check("k", 1_000), RateDecision::Allowed);
        assert!(matches!(
            limiter.check("k", 5_000),
            RateDecision::Limited { .. }
        ));
        // first request leaves the window
        assert_eq!(limiter.check("k", 11_001), RateDecision::Allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = SlidingWindowRateLimiter::new(60_000, 1);
        assert_eq!(limiter.check("a", 1_000), RateDecision::Allowed);
        assert_eq!(limiter.check("b", 1_000), RateDecision::Allowed);
    }

    #[test]
    fn test_fails_open_when_down() {
        let limiter = SlidingWindowRateLimiter::new(60_000, 1);
        limiter.check("a", 1_000);
        limiter.set_available(false);
        assert_eq!(limiter.check("a", 1_000), RateDecision::AllowedDegraded);
        limiter.set_available(true);
        assert!(matches!(
            limiter.check("a", 1_000),
            RateDecision::Limited { .. }
        ));
    }

    #[test]
    fn test_retry_after_reflects_window() {
        let limiter = SlidingWindowRateLimiter::new(60_000, 1);
        limiter.check("a", 1_000);
        match limiter.check("a", 2_000) {
            RateDecision::Limited { retry_after_secs } => {
                assert_eq!(retry_after_secs, 59);
            }
            other => panic!("expected limited, got {other:?}"),
        }
    }
}
