//! # AINP Broker
//!
//! Entry point: config from the environment, wiring, background jobs,
//! gateway, graceful shutdown on ctrl-c.

use ainp_broker::{config_from_env, Broker};
use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config_from_env();
    let addr: SocketAddr = std::env::var("BROKER_LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    info!("===========================================");
    info!("AINP broker starting");
    info!(addr = %addr, signature_verification = config.signature.enabled, credits = config.credits.enabled);
    info!("===========================================");

    let broker = Broker::build(config)?;
    let jobs = broker.spawn_jobs();
    let shutdown = broker.shutdown_signal();

    let state = broker.state.clone();
    let server = tokio::spawn(ainp_gateway::serve(state, addr, shutdown));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    broker.shutdown();

    server.await??;
    for job in jobs {
        job.await?;
    }
    info!("AINP broker stopped");
    Ok(())
}
