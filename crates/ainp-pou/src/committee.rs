//! # Committee Selection
//!
//! Deterministic given the receipt's stored seed:
//!
//! 1. eligibility and ranking come from the roster (registered, unexpired,
//!    neither provider nor client, staked when required; ranked by trust,
//!    usefulness, identifier);
//! 2. the ranked list is shuffled by HMAC(seed, identifier);
//! 3. the first `m` are the committee.
//!
//! With fewer than `m` eligible agents the committee is everyone and the
//! quorum scales down proportionally.

use ainp_crypto::seeded_shuffle;
use ainp_types::Did;

/// Quorum for a possibly short committee:
/// `k' = min(k, ceil(len * k / m))`.
#[must_use]
pub fn scaled_quorum(k: usize, m: usize, committee_len: usize) -> usize {
    if m == 0 || committee_len == 0 {
        return 0;
    }
    let scaled = (committee_len * k).div_ceil(m);
    scaled.min(k).max(1)
}

/// Select up to `m` committee members from the ranked eligibility list.
#[must_use]
pub fn select_committee(seed: &[u8], ranked_candidates: &[Did], m: usize) -> Vec<Did> {
    let shuffled = seeded_shuffle(seed, ranked_candidates);
    shuffled.into_iter().take(m).collect()
}
