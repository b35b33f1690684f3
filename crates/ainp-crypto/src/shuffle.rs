//! # Seeded Deterministic Shuffle
//!
//! Committee selection must be reproducible from the receipt's stored seed:
//! each candidate is ranked by `HMAC-SHA256(seed, candidate)` and the list
//! is sorted by that digest. Identical seed and candidate set always yield
//! the same order, regardless of input ordering.

use ainp_types::Did;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Order candidates deterministically under a seed.
///
/// Ties (identical digests) cannot occur for distinct identifiers, but the
/// comparison falls back to the identifier itself to keep the sort total.
#[must_use]
pub fn seeded_shuffle(seed: &[u8], candidates: &[Did]) -> Vec<Did> {
    let mut keyed: Vec<([u8; 32], Did)> = candidates
        .iter()
        .map(|did| (candidate_digest(seed, did), did.clone()))
        .collect();
    keyed.sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    keyed.into_iter().map(|(_, did)| did).collect()
}

/// Fresh cryptographically random 32-byte selection seed.
#[must_use]
pub fn selection_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

fn candidate_digest(seed: &[u8], did: &Did) -> [u8; 32] {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(seed)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(did.as_str().as_bytes());
    mac.finalize().into_bytes().into()
}
