//! # Convergence Scoring
//!
//! After each counter, the relative gap between the latest two proposals
//! is folded into a score in [0,1]: for every numeric term both proposals
//! share, `1 - min(1, gap / anchor)` where the anchor is the larger
//! magnitude; terms are averaged. Non-numeric terms are ignored; when no
//! numeric term is shared the previous score carries forward.

use serde_json::Value;

/// Guard against a zero anchor when both terms are 0.
const MIN_ANCHOR: f64 = f64::EPSILON;

/// Convergence between two proposals, `None` when they share no numeric
/// terms.
#[must_use]
pub fn convergence_between(previous: &Value, next: &Value) -> Option<f64> {
    let (Some(prev_map), Some(next_map)) = (previous.as_object(), next.as_object()) else {
        // scalar proposals compare directly
        return match (previous.as_f64(), next.as_f64()) {
            (Some(a), Some(b)) => Some(term_score(a, b)),
            _ => None,
        };
    };

    let mut total = 0.0;
    let mut terms = 0usize;
    for (key, prev_value) in prev_map {
        let (Some(a), Some(b)) = (
            prev_value.as_f64(),
            next_map.get(key).and_then(Value::as_f64),
        ) else {
            continue;
        };
        total += term_score(a, b);
        terms += 1;
    }
    (terms > 0).then(|| total / terms as f64)
}

fn term_score(a: f64, b: f64) -> f64 {
    let gap = (a - b).abs();
    let anchor = a.abs().max(b.abs()).max(MIN_ANCHOR);
    1.0 - (gap / anchor).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_proposals_fully_converged() {
        let score = convergence_between(&json!({"price": 90}), &json!({"price": 90})).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_gap_scenario() {
        // 100 -> 80: gap 20 over anchor 100
        let first = convergence_between(&json!({"price": 100}), &json!({"price": 80})).unwrap();
        assert!((first - 0.8).abs() < 1e-9);
        // 80 -> 90: gap 10 over anchor 90, strictly higher
        let second = convergence_between(&json!({"price": 80}), &json!({"price": 90})).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_multiple_terms_averaged() {
        let score = convergence_between(
            &json!({"price": 100, "deadline_hours": 48}),
            &json!({"price": 100, "deadline_hours": 24}),
        )
        .unwrap();
        // price term 1.0, deadline term 0.5
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_non_numeric_terms_ignored() {
        let score = convergence_between(
            &json!({"price": 50, "format": "json"}),
            &json!({"price": 50, "format": "csv"}),
        )
        .unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_shared_numeric_terms() {
        assert!(convergence_between(&json!({"format": "json"}), &json!({"format": "csv"})).is_none());
        assert!(convergence_between(&json!({"a": 1}), &json!({"b": 2})).is_none());
    }

    #[test]
    fn test_scalar_proposals() {
        let score = convergence_between(&json!(100), &json!(50)).unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_total_disagreement_is_zero() {
        let score = convergence_between(&json!({"price": 0}), &json!({"price": 100})).unwrap();
        assert!(score.abs() < 1e-9);
    }
}
