// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace Runtimes registry
//!
//! In-memory map from workspace ID to its live runtime. Guarantees at most
//! one live entry per workspace: a start reserves the slot with a STARTING
//! entry before any slow work and the slot is released only when the start
//! fails or the runtime is stopped.
//!
//! Every status event is published while the map lock is held, so the
//! order of events for a workspace matches the order of map transitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{DEFAULT_START_TIMEOUT, DEFAULT_STOP_TIMEOUT};
use crate::error::{Error, Result};
use crate::event::{EventService, WorkspaceEvent, WorkspaceStatusEvent};
use crate::infrastructure::{
    InfrastructureError, InternalRuntime, RuntimeContext, RuntimeInfrastructure, StartOptions,
};
use crate::model::{RuntimeIdentity, Workspace, WorkspaceStatus};
use crate::pool::{SharedPool, TaskHandle};
use crate::subject::Subject;

struct RuntimeEntry {
    status: WorkspaceStatus,
    context: Arc<RuntimeContext>,
    runtime: Option<InternalRuntime>,
}

/// Registry of live workspace runtimes.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct WorkspaceRuntimes {
    entries: Arc<RwLock<HashMap<String, RuntimeEntry>>>,
    infrastructures: Arc<Vec<Arc<dyn RuntimeInfrastructure>>>,
    events: Arc<dyn EventService>,
    pool: SharedPool,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl WorkspaceRuntimes {
    /// Create an empty registry over the given infrastructures.
    pub fn new(
        infrastructures: Vec<Arc<dyn RuntimeInfrastructure>>,
        events: Arc<dyn EventService>,
        pool: SharedPool,
    ) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            infrastructures: Arc::new(infrastructures),
            events,
            pool,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Bound infrastructure start and stop.
    pub fn with_timeouts(mut self, start_timeout: Duration, stop_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self.stop_timeout = stop_timeout;
        self
    }

    /// Recipe types any registered infrastructure can run.
    pub fn supported_recipe_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .infrastructures
            .iter()
            .flat_map(|infra| infra.recipe_types().iter().cloned())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// Start a workspace and wait for the outcome.
    pub async fn start(
        &self,
        workspace: &Workspace,
        env_name: &str,
        options: StartOptions,
    ) -> Result<InternalRuntime> {
        self.start_async(workspace, env_name, options).await?.await
    }

    /// Start a workspace on the shared pool.
    ///
    /// Validation, conflict and prepare failures are returned directly. Once
    /// the handle is returned, STARTING has been published and the outcome is
    /// reported through a RUNNING or ERROR event as well as the handle.
    pub async fn start_async(
        &self,
        workspace: &Workspace,
        env_name: &str,
        options: StartOptions,
    ) -> Result<TaskHandle<InternalRuntime>> {
        let workspace_id = workspace.id.clone();
        let environment = workspace
            .config
            .environments
            .get(env_name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Workspace '{}' doesn't contain environment '{}'",
                    workspace.qualified_name(),
                    env_name
                ))
            })?;

        if let Some(status) = self.live_status(&workspace_id).await {
            return Err(start_conflict(&workspace_id, status));
        }
        if self.pool.is_closed() {
            return Err(Error::PoolClosed);
        }

        let infrastructure = self.infrastructure_for(&environment.recipe.recipe_type, env_name)?;
        let estimated = infrastructure.estimate(environment).await?;
        let owner = Subject::current()
            .map(|s| s.user_id)
            .unwrap_or_else(|| workspace.namespace().to_string());
        let identity = RuntimeIdentity::new(workspace_id.clone(), env_name, owner);
        let context = infrastructure.prepare(identity.clone(), estimated).await?;

        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get(&workspace_id) {
                return Err(start_conflict(&workspace_id, entry.status));
            }
            entries.insert(
                workspace_id.clone(),
                RuntimeEntry {
                    status: WorkspaceStatus::Starting,
                    context: context.clone(),
                    runtime: None,
                },
            );
            self.publish_transition(
                &workspace_id,
                WorkspaceStatus::Stopped,
                WorkspaceStatus::Starting,
            );
        }

        info!(
            workspace_id = %workspace_id,
            env_name = %env_name,
            owner = %identity.owner(),
            infrastructure = %infrastructure.name(),
            "Starting workspace runtime"
        );

        let this = self.clone();
        let abandoned = self.clone();
        let abandoned_id = workspace_id.clone();
        match self.pool.submit_with_fallback(
            async move { this.run_start(context, options).await },
            async move {
                abandoned
                    .abandon(&abandoned_id, WorkspaceStatus::Starting)
                    .await
            },
        ) {
            Ok(handle) => Ok(handle),
            Err(_) => self.abandon(&workspace_id, WorkspaceStatus::Starting).await,
        }
    }

    async fn run_start(
        &self,
        context: Arc<RuntimeContext>,
        options: StartOptions,
    ) -> Result<InternalRuntime> {
        let workspace_id = context.identity().workspace_id().to_string();

        let result = match tokio::time::timeout(self.start_timeout, context.start(&options)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    workspace_id = %workspace_id,
                    timeout_secs = self.start_timeout.as_secs(),
                    "Runtime start timed out, stopping it"
                );
                match tokio::time::timeout(self.stop_timeout, context.stop(&options)).await {
                    Ok(Err(e)) => {
                        debug!(workspace_id = %workspace_id, error = %e, "Cleanup stop failed")
                    }
                    Err(_) => debug!(workspace_id = %workspace_id, "Cleanup stop timed out"),
                    Ok(Ok(())) => {}
                }
                Err(InfrastructureError::Timeout {
                    operation: "start",
                    timeout: self.start_timeout,
                }
                .into())
            }
        };

        let mut entries = self.entries.write().await;
        match result {
            Ok(runtime) => {
                if let Some(entry) = entries.get_mut(&workspace_id) {
                    entry.status = WorkspaceStatus::Running;
                    entry.runtime = Some(runtime.clone());
                }
                self.publish_transition(
                    &workspace_id,
                    WorkspaceStatus::Starting,
                    WorkspaceStatus::Running,
                );
                drop(entries);
                info!(workspace_id = %workspace_id, "Workspace runtime started");
                Ok(runtime)
            }
            Err(e) => {
                entries.remove(&workspace_id);
                self.publish_error(&workspace_id, WorkspaceStatus::Starting, &e);
                drop(entries);
                debug!(workspace_id = %workspace_id, error = %e, "Workspace runtime failed to start");
                Err(e)
            }
        }
    }

    /// Stop a running workspace and wait for the outcome.
    pub async fn stop(&self, workspace_id: &str, options: StartOptions) -> Result<()> {
        self.stop_async(workspace_id, options).await?.await
    }

    /// Stop a running workspace on the shared pool.
    ///
    /// The entry is removed once the stop finishes, whether it succeeded or
    /// not.
    pub async fn stop_async(
        &self,
        workspace_id: &str,
        options: StartOptions,
    ) -> Result<TaskHandle<()>> {
        if self.pool.is_closed() {
            return Err(Error::PoolClosed);
        }

        let context = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(workspace_id)
                .ok_or_else(|| not_running(workspace_id))?;
            if entry.status != WorkspaceStatus::Running {
                return Err(Error::Conflict(format!(
                    "Could not stop workspace '{}' because its status is '{}'",
                    workspace_id, entry.status
                )));
            }
            entry.status = WorkspaceStatus::Stopping;
            self.publish_transition(
                workspace_id,
                WorkspaceStatus::Running,
                WorkspaceStatus::Stopping,
            );
            entry.context.clone()
        };

        info!(workspace_id = %workspace_id, "Stopping workspace runtime");

        let this = self.clone();
        let abandoned = self.clone();
        let abandoned_id = workspace_id.to_string();
        match self.pool.submit_with_fallback(
            async move { this.run_stop(context, options).await },
            async move {
                abandoned
                    .abandon(&abandoned_id, WorkspaceStatus::Stopping)
                    .await
            },
        ) {
            Ok(handle) => Ok(handle),
            Err(_) => self.abandon(workspace_id, WorkspaceStatus::Stopping).await,
        }
    }

    /// Release the slot of a start or stop the pool will never run.
    async fn abandon<T>(&self, workspace_id: &str, prev: WorkspaceStatus) -> Result<T> {
        let error = Error::PoolClosed;
        let mut entries = self.entries.write().await;
        entries.remove(workspace_id);
        self.publish_error(workspace_id, prev, &error);
        drop(entries);
        warn!(
            workspace_id = %workspace_id,
            prev_status = %prev,
            "Shared pool closed before lifecycle task ran, workspace released"
        );
        Err(error)
    }

    async fn run_stop(&self, context: Arc<RuntimeContext>, options: StartOptions) -> Result<()> {
        let workspace_id = context.identity().workspace_id().to_string();

        let result = match tokio::time::timeout(self.stop_timeout, context.stop(&options)).await {
            Ok(result) => result,
            Err(_) => Err(InfrastructureError::Timeout {
                operation: "stop",
                timeout: self.stop_timeout,
            }
            .into()),
        };

        let mut entries = self.entries.write().await;
        entries.remove(&workspace_id);
        match &result {
            Ok(()) => {
                self.publish_transition(
                    &workspace_id,
                    WorkspaceStatus::Stopping,
                    WorkspaceStatus::Stopped,
                );
                drop(entries);
                info!(workspace_id = %workspace_id, "Workspace runtime stopped");
            }
            Err(e) => {
                self.publish_error(&workspace_id, WorkspaceStatus::Stopping, e);
                drop(entries);
                debug!(workspace_id = %workspace_id, error = %e, "Workspace runtime failed to stop");
            }
        }
        result
    }

    /// Runtime of a RUNNING workspace.
    pub async fn get(&self, workspace_id: &str) -> Result<InternalRuntime> {
        let entries = self.entries.read().await;
        entries
            .get(workspace_id)
            .filter(|entry| entry.status == WorkspaceStatus::Running)
            .and_then(|entry| entry.runtime.clone())
            .ok_or_else(|| not_running(workspace_id))
    }

    /// Whether the workspace has a live entry in any status.
    pub async fn has_runtime(&self, workspace_id: &str) -> bool {
        self.entries.read().await.contains_key(workspace_id)
    }

    /// Status of the workspace; STOPPED when it has no live entry.
    pub async fn status(&self, workspace_id: &str) -> WorkspaceStatus {
        self.live_status(workspace_id)
            .await
            .unwrap_or(WorkspaceStatus::Stopped)
    }

    /// IDs of workspaces with a live entry.
    pub async fn running_workspaces(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// URL of a named channel of a RUNNING workspace's runtime.
    pub async fn runtime_channel(&self, workspace_id: &str, channel: &str) -> Result<Url> {
        let context = self.get(workspace_id).await?.context().clone();
        context.runtime_channel(channel).await
    }

    /// Adopt runtimes the infrastructures report as live.
    ///
    /// Workspaces that already have an entry are skipped. Returns the number
    /// of adopted runtimes.
    pub async fn recover(&self) -> usize {
        let mut adopted = 0;
        for infrastructure in self.infrastructures.iter() {
            let identities = match infrastructure.identities().await {
                Ok(identities) => identities,
                Err(InfrastructureError::NotSupported(_)) => {
                    debug!(
                        infrastructure = %infrastructure.name(),
                        "Infrastructure cannot list runtimes, skipping recovery"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        infrastructure = %infrastructure.name(),
                        error = %e,
                        "Failed to list runtimes for recovery"
                    );
                    continue;
                }
            };

            for identity in identities {
                let Some(runtime) = infrastructure.runtime(&identity).await else {
                    debug!(identity = %identity, "Runtime vanished before recovery");
                    continue;
                };

                let mut entries = self.entries.write().await;
                if entries.contains_key(identity.workspace_id()) {
                    warn!(
                        workspace_id = %identity.workspace_id(),
                        "Workspace already has a runtime, not recovering another one"
                    );
                    continue;
                }
                entries.insert(
                    identity.workspace_id().to_string(),
                    RuntimeEntry {
                        status: WorkspaceStatus::Running,
                        context: runtime.context().clone(),
                        runtime: Some(runtime),
                    },
                );
                adopted += 1;
                info!(
                    workspace_id = %identity.workspace_id(),
                    env_name = %identity.env_name(),
                    infrastructure = %infrastructure.name(),
                    "Recovered workspace runtime"
                );
            }
        }
        adopted
    }

    /// Stop every RUNNING workspace and wait for the stops to finish.
    pub async fn shutdown(&self) {
        let running: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, entry)| entry.status == WorkspaceStatus::Running)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if running.is_empty() {
            return;
        }
        info!(count = running.len(), "Stopping running workspaces");

        let mut handles = Vec::with_capacity(running.len());
        for workspace_id in running {
            match self.stop_async(&workspace_id, StartOptions::new()).await {
                Ok(handle) => handles.push((workspace_id, handle)),
                Err(e) => {
                    error!(workspace_id = %workspace_id, error = %e, "Failed to stop workspace on shutdown")
                }
            }
        }
        for (workspace_id, handle) in handles {
            if let Err(e) = handle.await {
                error!(workspace_id = %workspace_id, error = %e, "Failed to stop workspace on shutdown");
            }
        }
    }

    fn infrastructure_for(
        &self,
        recipe_type: &str,
        env_name: &str,
    ) -> Result<Arc<dyn RuntimeInfrastructure>> {
        self.infrastructures
            .iter()
            .find(|infra| infra.recipe_types().iter().any(|t| t == recipe_type))
            .cloned()
            .ok_or_else(|| {
                Error::Validation(format!(
                    "Recipe type '{}' of environment '{}' is not supported",
                    recipe_type, env_name
                ))
            })
    }

    async fn live_status(&self, workspace_id: &str) -> Option<WorkspaceStatus> {
        self.entries
            .read()
            .await
            .get(workspace_id)
            .map(|entry| entry.status)
    }

    fn publish_transition(&self, workspace_id: &str, prev: WorkspaceStatus, status: WorkspaceStatus) {
        self.events.publish(WorkspaceEvent::Status(
            WorkspaceStatusEvent::transition(workspace_id, prev, status),
        ));
    }

    fn publish_error(&self, workspace_id: &str, prev: WorkspaceStatus, error: &Error) {
        self.events.publish(WorkspaceEvent::Status(WorkspaceStatusEvent::error(
            workspace_id,
            prev,
            error.to_string(),
        )));
    }
}

fn start_conflict(workspace_id: &str, status: WorkspaceStatus) -> Error {
    Error::Conflict(format!(
        "Could not start workspace '{}' because its status is '{}'",
        workspace_id, status
    ))
}

fn not_running(workspace_id: &str) -> Error {
    Error::NotFound(format!("Workspace with id '{}' is not running.", workspace_id))
}
