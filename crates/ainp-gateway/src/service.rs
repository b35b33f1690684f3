//! Gateway server entry point.

use crate::router::build_router;
use crate::state::AppState;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Server startup failures.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serve the API until the shutdown signal flips.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("Gateway draining");
        })
        .await?;
    Ok(())
}
