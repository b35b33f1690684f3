//! # Greylist
//!
//! First-contact delay between peers that are not mutual contacts. The
//! first attempt records the pair and is rejected with the remaining
//! delay; a resend after the delay passes. Entries for pairs that never
//! resend are garbage-collected.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of a greylist check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreylistDecision {
    /// Pair has served its delay.
    Pass,
    /// Delay still running; retry after this many seconds.
    Delay { retry_after_secs: u64 },
}

/// First-contact greylist keyed by (sender, recipient).
pub struct Greylist {
    /// pair -> first-seen instant (Unix ms).
    first_seen: Mutex<HashMap<(String, String), u64>>,
    delay_ms: u64,
    /// Entries older than this are dropped on access.
    retention_ms: u64,
}

impl Greylist {
    /// Keep pairs for a day after first sight.
    const DEFAULT_RETENTION_MS: u64 = 24 * 3_600_000;

    #[must_use]
    pub fn new(delay_secs: u64) -> Self {
        Self {
            first_seen: Mutex::new(HashMap::new()),
            delay_ms: delay_secs * 1_000,
            retention_ms: Self::DEFAULT_RETENTION_MS,
        }
    }

    /// Check a sender/recipient pair, recording first contact.
    pub fn check(&self, sender: &str, recipient: &str, now_ms: u64) -> GreylistDecision {
        let mut first_seen = self.first_seen.lock();
        first_seen.retain(|_, &mut seen| now_ms.saturating_sub(seen) < self.retention_ms);

        let key = (sender.to_string(), recipient.to_string());
        match first_seen.get(&key) {
            None => {
                first_seen.insert(key, now_ms);
                GreylistDecision::Delay {
                    retry_after_secs: self.delay_ms / 1_000,
                }
            }
            Some(&seen) => {
                let elapsed = now_ms.saturating_sub(seen);
                if elapsed >= self.delay_ms {
                    GreylistDecision::Pass
                } else {
                    let remaining_ms = self.delay_ms - elapsed;
                    GreylistDecision::Delay {
                        retry_after_secs: remaining_ms.div_ceil(1_000),
                    }
                }
            }
        }
    }

    /// Number of tracked pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.first_seen.lock().len()
    }

    /// Whether any pair is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_contact_delayed() {
        let greylist = Greylist::new(60);
        let decision = greylist.check("did:key:zA", "did:key:zB", 1_000);
        assert_eq!(
            decision,
            GreylistDecision::Delay {
                retry_after_secs: 60
            }
        );
    }

    #[test]
    fn test_resend_after_delay_passes() {
        let greylist = Greylist::new(60);
        greylist.check("did:key:zA", "did:key:zB", 1_000);
        let decision = greylist.check("did:key:zA", "did:key:zB", 61_000);
        assert_eq!(decision, GreylistDecision::Pass);
    }

    #[test]
    fn test_early_resend_reports_remaining() {
        let greylist = Greylist::new(60);
        greylist.check("did:key:zA", "did:key:zB", 1_000);
        let decision = greylist.check("did:key:zA", "did:key:zB", 31_000);
        assert_eq!(
            decision,
            GreylistDecision::Delay {
                retry_after_secs: 30
            }
        );
    }

    #[test]
    fn test_pairs_are_directional() {
        let greylist = Greylist::new(60);
        greylist.check("did:key:zA", "did:key:zB", 1_000);
        let reverse = greylist.check("did:key:zB", "did:key:zA", 1_000);
        assert!(matches!(reverse, GreylistDecision::Delay { .. }));
        assert_eq!(greylist.len(), 2);
    }
}
