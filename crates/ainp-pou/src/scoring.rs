//! # Usefulness Scoring
//!
//! Work-type-weighted scoring of a proof's metrics:
//!
//! | metric | points per unit | cap |
//! |--------|-----------------|-----|
//! | `compute_ms` | 1 / 1000 ms | 40 |
//! | `memory_bytes` | 1 / 10^6 bytes | 30 |
//! | `routing_hops` | 10 / hop | 20 |
//! | `validation_checks` | 5 / check | 10 |
//! | `learning_samples` | 0.5 / sample | 10 |
//!
//! Raw score is the sum of capped metric points, clamped to [0,100]. A
//! proof backed by attestations earns a 10% bonus, still clamped.

use crate::domain::{PouError, UsefulnessProof};

/// Attestation bonus multiplier.
const ATTESTED_BONUS: f64 = 1.10;

/// (metric key, points per unit, cap).
const METRIC_TABLE: [(&str, f64, f64); 5] = [
    ("compute_ms", 1.0 / 1000.0, 40.0),
    ("memory_bytes", 1.0 / 1_000_000.0, 30.0),
    ("routing_hops", 10.0, 20.0),
    ("validation_checks", 5.0, 10.0),
    ("learning_samples", 0.5, 10.0),
];

/// Validate a proof's shape and freshness.
///
/// # Errors
///
/// - no positive metric
/// - negative metric values
/// - timestamp outside `now ± skew`
pub fn validate_proof(
    proof: &UsefulnessProof,
    now_ms: u64,
    skew_ms: u64,
) -> Result<(), PouError> {
    if proof.metrics.values().any(|v| *v < 0.0 || !v.is_finite()) {
        return Err(PouError::InvalidProof("negative or non-finite metric"));
    }
    if !proof.metrics.values().any(|v| *v > 0.0) {
        return Err(PouError::InvalidProof("no positive metric"));
    }
    let lower = now_ms.saturating_sub(skew_ms);
    let upper = now_ms.saturating_add(skew_ms);
    if proof.timestamp < lower || proof.timestamp > upper {
        return Err(PouError::InvalidProof("timestamp outside freshness window"));
    }
    Ok(())
}

/// Score a validated proof into [0,100].
#[must_use]
pub fn score_proof(proof: &UsefulnessProof) -> f64 {
    let mut raw = 0.0;
    for (key, rate, cap) in METRIC_TABLE {
        if let Some(value) = proof.metrics.get(key) {
            raw += (value * rate).min(cap);
        }
    }
    let mut score = raw.clamp(0.0, 100.0);
    if !proof.attestations.is_empty() {
        score = (score * ATTESTED_BONUS).clamp(0.0, 100.0);
    }
    score
}
