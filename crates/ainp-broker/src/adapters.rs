//! # Cross-Subsystem Adapters
//!
//! Each subsystem declares ports for what it needs from the others; the
//! composition root implements them here. No component reaches into
//! another directly.

use ainp_bus::{Category, InMemoryStreamBus, StreamPublisher, Subject};
use ainp_discovery::{DiscoveryService, TrustDimension};
use ainp_gateway::SocketRegistry;
use ainp_guard::{PostageCharger, PostageError};
use ainp_ledger::{CreditLedger, LedgerError};
use ainp_negotiation::{ReceiptContext, ReceiptSink, Session, SessionNotifier};
use ainp_pou::{
    CommitteeRoster, NewReceipt, ReceiptNotifier, ReceiptService, TaskReceipt, UsefulnessSink,
};
use ainp_routing::SocketPush;
use ainp_types::{Clock, Did, Envelope, MsgType, NotificationBody, Payload};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Postage stamps are plain ledger spends with an envelope reference.
pub struct LedgerPostage {
    ledger: Arc<CreditLedger>,
}

impl LedgerPostage {
    #[must_use]
    pub fn new(ledger: Arc<CreditLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl PostageCharger for LedgerPostage {
    async fn charge(
        &self,
        sender: &Did,
        amount: u64,
        envelope_id: &str,
    ) -> Result<(), PostageError> {
        let metadata = serde_json::json!({"reason": "postage", "envelope": envelope_id});
        match self.ledger.spend(sender, amount, metadata) {
            Ok(_) => Ok(()),
            Err(LedgerError::InsufficientBalance {
                required,
                available,
            }) => Err(PostageError::Insufficient {
                required,
                available,
            }),
            Err(LedgerError::AccountNotFound(_)) => Err(PostageError::Insufficient {
                required: amount,
                available: 0,
            }),
            Err(err) => {
                warn!(error = %err, "Postage debit failed");
                Err(PostageError::Unavailable)
            }
        }
    }
}

/// Committee eligibility straight from the discovery registry.
pub struct DiscoveryRoster {
    discovery: Arc<DiscoveryService>,
    require_stake: bool,
}

impl DiscoveryRoster {
    #[must_use]
    pub fn new(discovery: Arc<DiscoveryService>, require_stake: bool) -> Self {
        Self {
            discovery,
            require_stake,
        }
    }
}

impl CommitteeRoster for DiscoveryRoster {
    fn candidates(&self, exclude: &[&Did]) -> Vec<Did> {
        self.discovery.committee_candidates(exclude, self.require_stake)
    }
}

/// Aggregated usefulness lands in the discovery ranking cache.
pub struct DiscoveryUsefulnessSink {
    discovery: Arc<DiscoveryService>,
}

impl DiscoveryUsefulnessSink {
    #[must_use]
    pub fn new(discovery: Arc<DiscoveryService>) -> Self {
        Self { discovery }
    }
}

impl UsefulnessSink for DiscoveryUsefulnessSink {
    fn write_usefulness(&self, agent: &Did, score: f64) {
        self.discovery.set_usefulness(agent, score);
    }
}

/// Negotiation transitions become `NOTIFICATION` envelopes on the
/// participant's results subject, plus an immediate socket push.
pub struct StreamNotifier {
    clock: Arc<dyn Clock>,
    bus: Arc<InMemoryStreamBus>,
    sockets: Arc<SocketRegistry>,
    broker_did: Did,
}

impl StreamNotifier {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, bus: Arc<InMemoryStreamBus>, sockets: Arc<SocketRegistry>) -> Self {
        let broker_did = Did::parse(ainp_routing::BROKER_DID)
            .unwrap_or_else(|_| unreachable!("broker identity is well-formed"));
        Self {
            clock,
            bus,
            sockets,
            broker_did,
        }
    }
}

#[async_trait]
impl SessionNotifier for StreamNotifier {
    async fn notify(&self, recipient: &Did, event: &str, session: &Session) {
        let envelope = Envelope {
            trace_id: session.intent_id.clone(),
            ..Envelope::new(
                self.broker_did.clone(),
                Some(recipient.clone()),
                MsgType::Notification,
                Payload::Notification(NotificationBody {
                    event: event.to_string(),
                    data: serde_json::json!({
                        "session_id": session.id,
                        "state": session.state,
                        "convergence": session.convergence,
                    }),
                }),
                self.clock.now_ms(),
            )
        };
        let subject = Subject::for_agent(Category::Results, recipient);
        if let Err(err) = self.bus.publish(&subject, envelope.clone()).await {
            warn!(recipient = %recipient, error = %err, "Notification publish failed");
        }
        self.sockets.push(recipient, &envelope).await;
    }
}

/// Terminal receipt transitions become `NOTIFICATION` envelopes on the
/// provider's and client's results subjects. The transition itself is
/// synchronous; publishing is fired off so the finalizer never blocks on
/// the stream.
pub struct ReceiptEventNotifier {
    clock: Arc<dyn Clock>,
    bus: Arc<InMemoryStreamBus>,
    discovery: Arc<DiscoveryService>,
    broker_did: Did,
}

/// Smoothing for trust observations fed back from receipt outcomes.
const TRUST_ALPHA: f64 = 0.2;

impl ReceiptEventNotifier {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        bus: Arc<InMemoryStreamBus>,
        discovery: Arc<DiscoveryService>,
    ) -> Self {
        let broker_did = Did::parse(ainp_routing::BROKER_DID)
            .unwrap_or_else(|_| unreachable!("broker identity is well-formed"));
        Self {
            clock,
            bus,
            discovery,
            broker_did,
        }
    }
}

impl ReceiptNotifier for ReceiptEventNotifier {
    fn receipt_transitioned(&self, receipt: &TaskReceipt) {
        // the outcome feeds the provider's trust vector used by discovery
        let finalized = receipt.status == ainp_pou::ReceiptStatus::Finalized;
        self.discovery.observe_trust(
            &receipt.provider,
            TrustDimension::Competence,
            if finalized { 1.0 } else { 0.0 },
            TRUST_ALPHA,
        );
        if !finalized {
            self.discovery.observe_trust(
                &receipt.provider,
                TrustDimension::Honesty,
                0.0,
                TRUST_ALPHA,
            );
        }

        for recipient in [&receipt.provider, &receipt.client] {
            let envelope = Envelope {
                trace_id: receipt.intent_id.clone(),
                ..Envelope::new(
                    self.broker_did.clone(),
                    Some(recipient.clone()),
                    MsgType::Notification,
                    Payload::Notification(NotificationBody {
                        event: "receipt.transitioned".into(),
                        data: serde_json::json!({
                            "task_id": receipt.id,
                            "status": receipt.status,
                        }),
                    }),
                    self.clock.now_ms(),
                )
            };
            let subject = Subject::for_agent(Category::Results, recipient);
            let bus = self.bus.clone();
            tokio::spawn(async move {
                if let Err(err) = bus.publish(&subject, envelope).await {
                    warn!(error = %err, "Receipt notification publish failed");
                }
            });
        }
    }
}

/// Settlements open pending task receipts in the PoU pipeline and count
/// as a reliability observation for the provider.
pub struct ReceiptBridge {
    receipts: Arc<ReceiptService>,
    discovery: Arc<DiscoveryService>,
}

impl ReceiptBridge {
    #[must_use]
    pub fn new(receipts: Arc<ReceiptService>, discovery: Arc<DiscoveryService>) -> Self {
        Self {
            receipts,
            discovery,
        }
    }
}

#[async_trait]
impl ReceiptSink for ReceiptBridge {
    async fn create_receipt(&self, context: ReceiptContext) -> Option<Uuid> {
        self.discovery.observe_trust(
            &context.provider,
            TrustDimension::Reliability,
            1.0,
            TRUST_ALPHA,
        );
        let receipt = self.receipts.create_receipt(NewReceipt {
            intent_id: context.intent_id,
            provider: context.provider,
            client: context.client,
            intent_type: "INTENT".to_string(),
            amount_atomic: context.amount_atomic,
            payment_ref: context.usefulness_proof_id,
            metrics: serde_json::Value::Null,
        });
        Some(receipt.id)
    }
}
