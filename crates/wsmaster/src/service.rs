// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable workspace master.
//!
//! This module provides [`WsMaster`] which wires the registry, the manager
//! and their collaborators together once at startup so they can be embedded
//! into an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsmaster::dao::{InMemoryAccountManager, InMemoryWorkspaceDao};
//! use wsmaster::infrastructure::MockInfrastructure;
//! use wsmaster::service::WsMaster;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let master = WsMaster::builder()
//!         .dao(Arc::new(InMemoryWorkspaceDao::new()))
//!         .accounts(Arc::new(InMemoryAccountManager::new()))
//!         .infrastructure(Arc::new(MockInfrastructure::new()))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... use master.manager() ...
//!
//!     master.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::dao::{AccountManager, WorkspaceDao};
use crate::event::{BroadcastEventService, EventService, WorkspaceEvent};
use crate::infrastructure::RuntimeInfrastructure;
use crate::manager::WorkspaceManager;
use crate::pool::SharedPool;
use crate::runtimes::WorkspaceRuntimes;
use crate::validator::{DefaultWorkspaceValidator, WorkspaceValidator};

/// Builder for creating a [`WsMaster`].
#[derive(Default)]
pub struct WsMasterBuilder {
    dao: Option<Arc<dyn WorkspaceDao>>,
    accounts: Option<Arc<dyn AccountManager>>,
    infrastructures: Vec<Arc<dyn RuntimeInfrastructure>>,
    events: Option<Arc<dyn EventService>>,
    validator: Option<Arc<dyn WorkspaceValidator>>,
    config: Config,
}

impl WsMasterBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace storage (required).
    pub fn dao(mut self, dao: Arc<dyn WorkspaceDao>) -> Self {
        self.dao = Some(dao);
        self
    }

    /// Set the account lookup (required).
    pub fn accounts(mut self, accounts: Arc<dyn AccountManager>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Register an infrastructure (at least one is required).
    pub fn infrastructure(mut self, infrastructure: Arc<dyn RuntimeInfrastructure>) -> Self {
        self.infrastructures.push(infrastructure);
        self
    }

    /// Publish events through a custom service instead of a broadcast channel.
    pub fn event_service(mut self, events: Arc<dyn EventService>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replace the default validator.
    pub fn validator(mut self, validator: Arc<dyn WorkspaceValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the master configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<WsMasterConfig> {
        let dao = self.dao.ok_or_else(|| anyhow::anyhow!("dao is required"))?;
        let accounts = self
            .accounts
            .ok_or_else(|| anyhow::anyhow!("accounts is required"))?;
        if self.infrastructures.is_empty() {
            anyhow::bail!("at least one infrastructure is required");
        }
        if self.config.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than zero");
        }

        Ok(WsMasterConfig {
            dao,
            accounts,
            infrastructures: self.infrastructures,
            events: self.events,
            validator: self.validator,
            config: self.config,
        })
    }
}

/// Configuration for a [`WsMaster`].
pub struct WsMasterConfig {
    dao: Arc<dyn WorkspaceDao>,
    accounts: Arc<dyn AccountManager>,
    infrastructures: Vec<Arc<dyn RuntimeInfrastructure>>,
    events: Option<Arc<dyn EventService>>,
    validator: Option<Arc<dyn WorkspaceValidator>>,
    config: Config,
}

impl WsMasterConfig {
    /// Wire everything together and recover live runtimes if configured.
    pub async fn start(self) -> Result<WsMaster> {
        let config = self.config;

        let (events, broadcast) = match self.events {
            Some(events) => (events, None),
            None => {
                let service = BroadcastEventService::new(config.event_capacity);
                (
                    Arc::new(service.clone()) as Arc<dyn EventService>,
                    Some(service),
                )
            }
        };

        let pool = SharedPool::new(config.pool_size);
        let infrastructure_count = self.infrastructures.len();
        let runtimes = WorkspaceRuntimes::new(self.infrastructures, events.clone(), pool.clone())
            .with_timeouts(config.start_timeout, config.stop_timeout);

        let validator = self.validator.unwrap_or_else(|| {
            Arc::new(DefaultWorkspaceValidator::new(
                runtimes.supported_recipe_types(),
            ))
        });

        let manager = WorkspaceManager::new(
            self.dao,
            self.accounts,
            runtimes.clone(),
            events,
            validator,
        );

        if config.recover_runtimes {
            let recovered = runtimes.recover().await;
            manager.sync_with_runtimes().await;
            if recovered > 0 {
                info!(recovered, "Recovered workspace runtimes");
            }
        }

        info!(
            pool_size = config.pool_size,
            infrastructures = infrastructure_count,
            recipe_types = ?runtimes.supported_recipe_types(),
            "WsMaster started"
        );

        Ok(WsMaster {
            manager,
            runtimes,
            pool,
            broadcast,
            config,
        })
    }
}

/// A running workspace master.
pub struct WsMaster {
    manager: WorkspaceManager,
    runtimes: WorkspaceRuntimes,
    pool: SharedPool,
    broadcast: Option<BroadcastEventService>,
    config: Config,
}

impl WsMaster {
    /// Create a new builder for configuring the master.
    pub fn builder() -> WsMasterBuilder {
        WsMasterBuilder::new()
    }

    /// Workspace manager facade.
    pub fn manager(&self) -> &WorkspaceManager {
        &self.manager
    }

    /// Runtimes registry.
    pub fn runtimes(&self) -> &WorkspaceRuntimes {
        &self.runtimes
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to lifecycle events.
    ///
    /// `None` when a custom event service was supplied to the builder.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<WorkspaceEvent>> {
        self.broadcast.as_ref().map(BroadcastEventService::subscribe)
    }

    /// Check if the master still accepts lifecycle operations.
    pub fn is_running(&self) -> bool {
        !self.pool.is_closed()
    }

    /// Gracefully shut down the master.
    ///
    /// Stops every running workspace, then gives in-flight lifecycle tasks
    /// the configured grace period before closing the shared pool.
    pub async fn shutdown(self) -> Result<()> {
        info!("WsMaster shutting down...");

        self.runtimes.shutdown().await;

        if !self.pool.shutdown(self.config.shutdown_grace).await {
            warn!("Some lifecycle tasks were still running at shutdown");
        }

        info!("WsMaster shutdown complete");
        Ok(())
    }
}
