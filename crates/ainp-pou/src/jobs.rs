//! # Background Workers
//!
//! The finalizer and the usefulness aggregator as shutdown-aware loops.
//! Each pass is bounded by the work it finds; the interval keeps runs from
//! overlapping under normal operation, and both passes are safe to overlap
//! anyway (evaluation is idempotent, aggregation is last-writer-wins).

use crate::service::ReceiptService;
use crate::usefulness::UsefulnessService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Run the receipt finalizer until shutdown.
pub async fn run_finalizer(
    service: Arc<ReceiptService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    info!(interval_secs = interval.as_secs(), "Finalizer worker started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let transitioned = service.finalize_due();
                if transitioned > 0 {
                    debug!(transitioned, "Finalizer pass transitioned receipts");
                }
            }
            _ = shutdown.changed() => {
                info!("Finalizer worker stopping");
                break;
            }
        }
    }
}

/// Run the usefulness aggregator until shutdown.
pub async fn run_aggregator(
    service: Arc<UsefulnessService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    info!(interval_secs = interval.as_secs(), "Usefulness aggregator started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                service.aggregate();
            }
            _ = shutdown.changed() => {
                info!("Usefulness aggregator stopping");
                break;
            }
        }
    }
}
