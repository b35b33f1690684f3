//! Shared application state handed to every handler.

use ainp_bus::InMemoryStreamBus;
use ainp_discovery::DiscoveryService;
use ainp_ledger::{CreditLedger, PaymentService};
use ainp_mail::MailStore;
use ainp_negotiation::NegotiationEngine;
use ainp_pou::{ReceiptService, UsefulnessService};
use ainp_routing::RoutingService;
use ainp_types::{BrokerConfig, Clock};
use std::sync::Arc;

use crate::sockets::SocketRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: BrokerConfig,
    pub clock: Arc<dyn Clock>,
    pub routing: Arc<RoutingService>,
    pub discovery: Arc<DiscoveryService>,
    pub mail: Arc<MailStore>,
    pub ledger: Arc<CreditLedger>,
    pub payments: Arc<PaymentService>,
    pub negotiation: Arc<NegotiationEngine>,
    pub receipts: Arc<ReceiptService>,
    pub usefulness: Arc<UsefulnessService>,
    pub bus: Arc<InMemoryStreamBus>,
    pub sockets: Arc<SocketRegistry>,
}
