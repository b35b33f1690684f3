//! # Broker Runtime
//!
//! The composition root. Builds every subsystem, wires the port adapters
//! between them, and owns the background jobs. There are no globals: all
//! coupling flows through the constructors here.
//!
//! ## Wiring
//!
//! ```text
//! gateway ──▶ routing ──▶ guard ──▶ ledger (postage)
//!    │            │         ▲
//!    │            ├──▶ discovery ◀── usefulness sink ── pou aggregator
//!    │            ├──▶ mail
//!    │            ├──▶ stream bus ◀── notifier ── negotiation
//!    │            └──▶ sockets
//!    └──▶ negotiation ──▶ ledger, receipt sink ──▶ pou receipts
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config_env;

use adapters::{
    DiscoveryRoster, DiscoveryUsefulnessSink, LedgerPostage, ReceiptBridge, ReceiptEventNotifier,
    StreamNotifier,
};
use ainp_bus::InMemoryStreamBus;
use ainp_discovery::{DiscoveryService, HashEmbedder};
use ainp_gateway::{AppState, SocketRegistry};
use ainp_guard::{EnvelopeGuard, NoPostage, PostageCharger};
use ainp_ledger::{CreditLedger, PaymentService};
use ainp_mail::MailStore;
use ainp_negotiation::NegotiationEngine;
use ainp_pou::{ReceiptService, UsefulnessService};
use ainp_routing::RoutingService;
use ainp_types::{BrokerConfig, Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub use config_env::config_from_env;

/// A fully wired broker.
pub struct Broker {
    pub state: AppState,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Broker {
    /// Wire every subsystem against the system clock.
    pub fn build(config: BrokerConfig) -> anyhow::Result<Self> {
        Self::build_with_clock(config, Arc::new(SystemClock))
    }

    /// Wire every subsystem against an explicit clock (tests use a manual
    /// one).
    pub fn build_with_clock(config: BrokerConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;

        let bus = Arc::new(InMemoryStreamBus::new(clock.clone()));
        let sockets = Arc::new(SocketRegistry::new());
        let mail = Arc::new(MailStore::new(clock.clone()));
        let ledger = Arc::new(CreditLedger::new(clock.clone()));
        let payments = Arc::new(PaymentService::new(clock.clone(), ledger.clone()));
        let discovery = Arc::new(DiscoveryService::new(
            clock.clone(),
            config.discovery.clone(),
            Arc::new(HashEmbedder),
        ));

        let postage: Arc<dyn PostageCharger> = if config.credits.enabled {
            Arc::new(LedgerPostage::new(ledger.clone()))
        } else {
            Arc::new(NoPostage)
        };
        let guard = Arc::new(EnvelopeGuard::new(clock.clone(), config.clone(), postage));

        let routing = Arc::new(RoutingService::new(
            clock.clone(),
            config.clone(),
            guard,
            discovery.clone(),
            mail.clone(),
            bus.clone(),
            sockets.clone(),
        ));

        let receipts = Arc::new(
            ReceiptService::new(
                clock.clone(),
                config.pou.clone(),
                Arc::new(DiscoveryRoster::new(
                    discovery.clone(),
                    config.pou.require_stake,
                )),
            )
            .with_notifier(Arc::new(ReceiptEventNotifier::new(
                clock.clone(),
                bus.clone(),
                discovery.clone(),
            ))),
        );
        let usefulness = Arc::new(UsefulnessService::new(
            clock.clone(),
            UsefulnessService::DEFAULT_SKEW_MS,
            Arc::new(DiscoveryUsefulnessSink::new(discovery.clone())),
        ));

        let negotiation = Arc::new(NegotiationEngine::new(
            clock.clone(),
            config.negotiation.clone(),
            config.credits.enabled,
            ledger.clone(),
            Arc::new(StreamNotifier::new(
                clock.clone(),
                bus.clone(),
                sockets.clone(),
            )),
            Arc::new(ReceiptBridge::new(receipts.clone(), discovery.clone())),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            config,
            clock,
            routing,
            discovery,
            mail,
            ledger,
            payments,
            negotiation,
            receipts,
            usefulness,
            bus,
            sockets,
        };
        Ok(Self {
            state,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Shutdown signal receiver for servers and jobs.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Flip the shutdown signal; jobs and the gateway drain.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Spawn the background jobs: receipt finalizer, usefulness
    /// aggregator, negotiation expiry sweeper, stream retention and
    /// payment expiry sweeps.
    pub fn spawn_jobs(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let config = &self.state.config;

        handles.push(tokio::spawn(ainp_pou::run_finalizer(
            self.state.receipts.clone(),
            Duration::from_secs(config.pou.finalizer_interval_secs.max(1)),
            self.shutdown_rx.clone(),
        )));

        handles.push(tokio::spawn(ainp_pou::run_aggregator(
            self.state.usefulness.clone(),
            Duration::from_secs(config.pou.aggregation_interval_hours.max(1) * 3_600),
            self.shutdown_rx.clone(),
        )));

        {
            let negotiation = self.state.negotiation.clone();
            let interval =
                Duration::from_secs(config.negotiation.expiration_interval_secs.max(1));
            let mut shutdown = self.shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => { negotiation.sweep_expired().await; }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        {
            let bus = self.state.bus.clone();
            let payments = self.state.payments.clone();
            let discovery = self.state.discovery.clone();
            let mut shutdown = self.shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(60));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            bus.sweep_retention();
                            payments.sweep_expired();
                            discovery.decay_trust();
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        info!(jobs = handles.len(), "Background jobs started");
        handles
    }
}
