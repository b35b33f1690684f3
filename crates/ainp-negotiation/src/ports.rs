//! Outbound ports of the negotiation engine. The composition root backs
//! the notifier with the stream broker and the receipt sink with the
//! proof-of-usefulness pipeline.

use crate::domain::Session;
use ainp_types::Did;
use async_trait::async_trait;
use uuid::Uuid;

/// Pushes session lifecycle events to the affected agents.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    /// Notify a participant of a transition, e.g. `negotiation.accepted`.
    async fn notify(&self, recipient: &Did, event: &str, session: &Session);
}

/// Notifier that drops events (tests, minimal profiles).
pub struct NoopNotifier;

#[async_trait]
impl SessionNotifier for NoopNotifier {
    async fn notify(&self, _recipient: &Did, _event: &str, _session: &Session) {}
}

/// Everything the receipt pipeline needs from a settlement.
#[derive(Debug, Clone)]
pub struct ReceiptContext {
    pub intent_id: String,
    /// The agent that performed the work.
    pub provider: Did,
    /// The agent paying for it.
    pub client: Did,
    pub amount_atomic: u64,
    pub validator_did: Option<Did>,
    pub usefulness_proof_id: Option<String>,
}

/// Creates the pending task receipt on settlement.
#[async_trait]
pub trait ReceiptSink: Send + Sync {
    /// Returns the created receipt id, when the pipeline is active.
    async fn create_receipt(&self, context: ReceiptContext) -> Option<Uuid>;
}

/// Sink that records nothing (tests, receipts disabled).
pub struct NoopReceiptSink;

#[async_trait]
impl ReceiptSink for NoopReceiptSink {
    async fn create_receipt(&self, _context: ReceiptContext) -> Option<Uuid> {
        None
    }
}
