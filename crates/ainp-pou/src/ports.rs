//! Outbound ports of the proof-of-usefulness pipeline.

use ainp_types::Did;

/// Supplies ranked committee eligibility (the discovery registry in the
/// wired broker).
pub trait CommitteeRoster: Send + Sync {
    /// Eligible agents ranked by trust, usefulness, identifier; excluding
    /// the given parties.
    fn candidates(&self, exclude: &[&Did]) -> Vec<Did>;
}

/// Fixed roster for tests and minimal profiles.
pub struct StaticRoster(pub Vec<Did>);

impl CommitteeRoster for StaticRoster {
    fn candidates(&self, exclude: &[&Did]) -> Vec<Did> {
        self.0
            .iter()
            .filter(|did| !exclude.contains(did))
            .cloned()
            .collect()
    }
}

/// Receives aggregated usefulness scores (the discovery cache in the wired
/// broker).
pub trait UsefulnessSink: Send + Sync {
    /// Write an agent's rolling score in [0,100].
    fn write_usefulness(&self, agent: &Did, score: f64);
}

/// Sink that drops scores (tests).
pub struct NullSink;

impl UsefulnessSink for NullSink {
    fn write_usefulness(&self, _agent: &Did, _score: f64) {}
}

/// Observes terminal receipt transitions (the wired broker turns these
/// into notification envelopes on the parties' results subjects).
pub trait ReceiptNotifier: Send + Sync {
    /// A receipt just moved to `finalized` or `disputed`.
    fn receipt_transitioned(&self, receipt: &crate::domain::TaskReceipt);
}

/// Notifier that drops transitions (tests, minimal profiles).
pub struct NullReceiptNotifier;

impl ReceiptNotifier for NullReceiptNotifier {
    fn receipt_transitioned(&self, _receipt: &crate::domain::TaskReceipt) {}
}
