// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wsmaster - Workspace Runtime Lifecycle Manager
//!
//! Runs the workspace master stand-alone with in-memory persistence and the
//! mock infrastructure, logging every lifecycle event until Ctrl-C.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use wsmaster::config::Config;
use wsmaster::dao::{InMemoryAccountManager, InMemoryWorkspaceDao};
use wsmaster::infrastructure::{MockInfrastructure, RuntimeInfrastructure};
use wsmaster::service::WsMaster;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wsmaster=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        pool_size = config.pool_size,
        start_timeout_secs = config.start_timeout.as_secs(),
        stop_timeout_secs = config.stop_timeout.as_secs(),
        "Starting wsmaster"
    );

    let infrastructure = Arc::new(MockInfrastructure::new());
    info!(
        infrastructure = infrastructure.name(),
        "Infrastructure initialized"
    );

    let master = WsMaster::builder()
        .dao(Arc::new(InMemoryWorkspaceDao::new()))
        .accounts(Arc::new(InMemoryAccountManager::new()))
        .infrastructure(infrastructure)
        .config(config)
        .build()?
        .start()
        .await?;

    if let Some(mut events) = master.subscribe() {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => info!(?event, "Workspace event"),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event logger fell behind")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    info!("wsmaster ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    master.shutdown().await?;

    info!("wsmaster shut down");

    Ok(())
}
