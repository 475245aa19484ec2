// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace Manager
//!
//! Facade over persistence and the runtimes registry. Keeps its own status
//! cache so readers see a pending transition as soon as it is accepted, and
//! overlays that status on every workspace it returns.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::dao::{AccountManager, WorkspaceDao};
use crate::error::{Error, Result};
use crate::event::{EventService, WorkspaceEvent};
use crate::infrastructure::{InternalRuntime, StartOptions};
use crate::model::{
    Account, CREATED_ATTRIBUTE_NAME, Runtime, UPDATED_ATTRIBUTE_NAME, Workspace, WorkspaceConfig,
    WorkspaceStatus, now_millis,
};
use crate::pool::TaskHandle;
use crate::runtimes::WorkspaceRuntimes;
use crate::subject::Subject;
use crate::validator::WorkspaceValidator;

/// Replacement content for [`WorkspaceManager::update_workspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceUpdate {
    /// New configuration
    pub config: WorkspaceConfig,
    /// New attributes; `updated` is refreshed on top of them
    pub attributes: HashMap<String, String>,
    /// New temporary flag
    pub temporary: bool,
}

/// Workspace CRUD and lifecycle facade.
///
/// Cheap to clone; clones share the same status cache.
#[derive(Clone)]
pub struct WorkspaceManager {
    dao: Arc<dyn WorkspaceDao>,
    accounts: Arc<dyn AccountManager>,
    runtimes: WorkspaceRuntimes,
    events: Arc<dyn EventService>,
    validator: Arc<dyn WorkspaceValidator>,
    states: Arc<RwLock<HashMap<String, WorkspaceStatus>>>,
}

impl WorkspaceManager {
    /// Create a manager.
    pub fn new(
        dao: Arc<dyn WorkspaceDao>,
        accounts: Arc<dyn AccountManager>,
        runtimes: WorkspaceRuntimes,
        events: Arc<dyn EventService>,
        validator: Arc<dyn WorkspaceValidator>,
    ) -> Self {
        Self {
            dao,
            accounts,
            runtimes,
            events,
            validator,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The runtimes registry the manager drives.
    pub fn runtimes(&self) -> &WorkspaceRuntimes {
        &self.runtimes
    }

    /// Mark runtimes already live in the registry as RUNNING.
    ///
    /// Used after registry recovery so that recovered workspaces report
    /// their status and can be stopped.
    pub async fn sync_with_runtimes(&self) {
        let live = self.runtimes.running_workspaces().await;
        let mut states = self.states.write().await;
        for workspace_id in live {
            let status = self.runtimes.status(&workspace_id).await;
            if status == WorkspaceStatus::Running {
                states.entry(workspace_id).or_insert(status);
            }
        }
    }

    /// Validate, persist and announce a new workspace.
    pub async fn create_workspace(
        &self,
        config: WorkspaceConfig,
        namespace: &str,
        attributes: HashMap<String, String>,
    ) -> Result<Workspace> {
        self.validator.validate_config(&config)?;
        let account = self.accounts.get_by_name(namespace).await?;
        self.do_create_workspace(config, account, attributes, false)
            .await
    }

    /// Workspace by composite key.
    ///
    /// A key without `:` is an ID. `namespace:name` looks the workspace up by
    /// name; `:name` uses the current subject's namespace.
    pub async fn get_workspace(&self, key: &str) -> Result<Workspace> {
        let workspace = match key.split_once(':') {
            None => self.dao.get(key).await?,
            Some((namespace, name)) => {
                if name.is_empty() {
                    return Err(Error::Validation(format!(
                        "Workspace key '{}' is not valid, workspace name is missing",
                        key
                    )));
                }
                let namespace = if namespace.is_empty() {
                    Subject::current()
                        .map(|subject| subject.user_name)
                        .ok_or_else(|| {
                            Error::Validation(format!(
                                "Workspace key '{}' has no namespace and there is no current user",
                                key
                            ))
                        })?
                } else {
                    namespace.to_string()
                };
                self.dao.get_by_name(name, &namespace).await?
            }
        };
        Ok(self.normalize(workspace, true).await)
    }

    /// Workspace by name within a namespace.
    pub async fn get_workspace_by_name(&self, name: &str, namespace: &str) -> Result<Workspace> {
        let workspace = self.dao.get_by_name(name, namespace).await?;
        Ok(self.normalize(workspace, true).await)
    }

    /// Workspaces the user can access.
    pub async fn get_workspaces(&self, user: &str, include_runtimes: bool) -> Result<Vec<Workspace>> {
        let workspaces = self.dao.get_workspaces(user).await?;
        self.normalize_all(workspaces, include_runtimes).await
    }

    /// Workspaces in a namespace.
    pub async fn get_by_namespace(
        &self,
        namespace: &str,
        include_runtimes: bool,
    ) -> Result<Vec<Workspace>> {
        let workspaces = self.dao.get_by_namespace(namespace).await?;
        self.normalize_all(workspaces, include_runtimes).await
    }

    /// Replace configuration, attributes and temporary flag of a workspace.
    pub async fn update_workspace(&self, id: &str, update: WorkspaceUpdate) -> Result<Workspace> {
        self.validator.validate_config(&update.config)?;
        let mut workspace = self.dao.get(id).await?;
        workspace.config = update.config;
        workspace.attributes = update.attributes;
        workspace
            .attributes
            .insert(UPDATED_ATTRIBUTE_NAME.to_string(), now_millis());
        workspace.temporary = update.temporary;
        let workspace = self.dao.update(workspace).await?;
        Ok(self.normalize(workspace, true).await)
    }

    /// Remove a workspace that is not running.
    pub async fn remove_workspace(&self, id: &str) -> Result<()> {
        if self.runtimes.has_runtime(id).await {
            return Err(Error::Conflict(format!(
                "The workspace '{}' is currently running and cannot be removed.",
                id
            )));
        }
        self.dao.remove(id).await?;
        info!(
            workspace_id = %id,
            user = %Subject::current_user_name(),
            "Workspace removed"
        );
        Ok(())
    }

    /// Start a stored workspace.
    ///
    /// Returns the workspace in STARTING; the outcome is reported by events
    /// and by later reads.
    pub async fn start_workspace(
        &self,
        id: &str,
        env_name: Option<&str>,
        options: StartOptions,
    ) -> Result<Workspace> {
        let workspace = self.dao.get(id).await?;
        let env_name = env_name
            .map(str::to_string)
            .unwrap_or_else(|| workspace.config.default_env.clone());
        self.start_async(workspace, env_name, options).await
    }

    /// Create a workspace from a configuration and start its default
    /// environment.
    ///
    /// A temporary workspace is removed once it stops or fails to start.
    pub async fn start_workspace_from_config(
        &self,
        config: WorkspaceConfig,
        namespace: &str,
        temporary: bool,
        options: StartOptions,
    ) -> Result<Workspace> {
        self.validator.validate_config(&config)?;
        let account = self.accounts.get_by_name(namespace).await?;
        let workspace = self
            .do_create_workspace(config, account, HashMap::new(), temporary)
            .await?;
        let env_name = workspace.config.default_env.clone();
        let id = workspace.id.clone();

        match self.start_async(workspace, env_name, options).await {
            Ok(workspace) => Ok(workspace),
            Err(e) => {
                if temporary {
                    self.remove_quietly(&id).await;
                }
                Err(e)
            }
        }
    }

    /// Stop a RUNNING workspace.
    pub async fn stop_workspace(&self, id: &str, options: StartOptions) -> Result<()> {
        let workspace = self.dao.get(id).await?;

        {
            let mut states = self.states.write().await;
            let status = match states.get(id) {
                Some(status) => *status,
                None => self.runtimes.status(id).await,
            };
            if status != WorkspaceStatus::Running {
                return Err(Error::Conflict(format!(
                    "Could not stop the workspace '{}' because its status is '{}'.",
                    workspace.qualified_name(),
                    status
                )));
            }
            states.insert(id.to_string(), WorkspaceStatus::Stopping);
        }

        let stopped_by = Subject::current_user_name();
        info!(
            workspace = %workspace.qualified_name(),
            workspace_id = %id,
            user = %stopped_by,
            "Workspace is being stopped"
        );

        let handle = match self.runtimes.stop_async(id, options).await {
            Ok(handle) => handle,
            Err(e) => {
                let mut states = self.states.write().await;
                if matches!(e, Error::NotFound(_)) {
                    states.remove(id);
                } else {
                    states.insert(id.to_string(), WorkspaceStatus::Running);
                }
                return Err(e);
            }
        };

        let manager = self.clone();
        tokio::spawn(async move { manager.watch_stop(workspace, stopped_by, handle).await });
        Ok(())
    }

    async fn start_async(
        &self,
        mut workspace: Workspace,
        env_name: String,
        options: StartOptions,
    ) -> Result<Workspace> {
        if !workspace.config.environments.contains_key(&env_name) {
            return Err(Error::NotFound(format!(
                "Workspace '{}' doesn't contain environment '{}'",
                workspace.qualified_name(),
                env_name
            )));
        }

        let id = workspace.id.clone();
        {
            let mut states = self.states.write().await;
            if let Some(status) = states.get(&id) {
                return Err(Error::Conflict(format!(
                    "Could not start workspace '{}' because its status is '{}'",
                    id, status
                )));
            }
            states.insert(id.clone(), WorkspaceStatus::Starting);
        }

        let handle = match self
            .runtimes
            .start_async(&workspace, &env_name, options)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.states.write().await.remove(&id);
                return Err(e);
            }
        };

        workspace
            .attributes
            .insert(UPDATED_ATTRIBUTE_NAME.to_string(), now_millis());
        let workspace = match self.dao.update(workspace.clone()).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(workspace_id = %id, error = %e, "Failed to persist starting workspace");
                workspace
            }
        };

        let manager = self.clone();
        let started_by = Subject::current_user_name();
        let watched = workspace.clone();
        tokio::spawn(async move { manager.watch_start(watched, started_by, handle).await });

        Ok(self.normalize(workspace, true).await)
    }

    async fn watch_start(
        &self,
        workspace: Workspace,
        started_by: String,
        handle: TaskHandle<InternalRuntime>,
    ) {
        match handle.await {
            Ok(_) => {
                if let Some(status) = self.states.write().await.get_mut(&workspace.id) {
                    *status = WorkspaceStatus::Running;
                }
                info!(
                    workspace = %workspace.qualified_name(),
                    workspace_id = %workspace.id,
                    user = %started_by,
                    "Workspace started"
                );
            }
            Err(e) => {
                self.states.write().await.remove(&workspace.id);
                if workspace.temporary {
                    self.remove_quietly(&workspace.id).await;
                }
                if e.is_caused_by_source_not_found() {
                    debug!(workspace_id = %workspace.id, error = %e, "Workspace source not found");
                } else {
                    error!(workspace_id = %workspace.id, error = %e, "Workspace failed to start");
                }
            }
        }
    }

    async fn watch_stop(&self, mut workspace: Workspace, stopped_by: String, handle: TaskHandle<()>) {
        let result = handle.await;
        self.states.write().await.remove(&workspace.id);

        match result {
            Ok(()) => {
                if !workspace.temporary {
                    workspace
                        .attributes
                        .insert(UPDATED_ATTRIBUTE_NAME.to_string(), now_millis());
                    if let Err(e) = self.dao.update(workspace.clone()).await {
                        warn!(workspace_id = %workspace.id, error = %e, "Failed to persist stopped workspace");
                    }
                }
                info!(
                    workspace = %workspace.qualified_name(),
                    workspace_id = %workspace.id,
                    user = %stopped_by,
                    "Workspace stopped"
                );
            }
            Err(e) => {
                error!(workspace_id = %workspace.id, error = %e, "Workspace failed to stop");
            }
        }

        if workspace.temporary {
            self.remove_quietly(&workspace.id).await;
        }
    }

    async fn do_create_workspace(
        &self,
        config: WorkspaceConfig,
        account: Account,
        attributes: HashMap<String, String>,
        temporary: bool,
    ) -> Result<Workspace> {
        let mut workspace = Workspace::new(account, config);
        workspace.attributes = attributes;
        workspace.temporary = temporary;
        workspace
            .attributes
            .insert(CREATED_ATTRIBUTE_NAME.to_string(), now_millis());

        let workspace = self.dao.create(workspace).await?;
        info!(
            workspace = %workspace.qualified_name(),
            workspace_id = %workspace.id,
            user = %Subject::current_user_name(),
            "Workspace created"
        );
        self.events.publish(WorkspaceEvent::Created {
            workspace_id: workspace.id.clone(),
            namespace: workspace.namespace().to_string(),
            name: workspace.config.name.clone(),
        });
        Ok(workspace)
    }

    async fn remove_quietly(&self, id: &str) {
        if let Err(e) = self.dao.remove(id).await {
            error!(workspace_id = %id, error = %e, "Unable to remove temporary workspace");
        }
    }

    async fn normalize_all(
        &self,
        workspaces: Vec<Workspace>,
        include_runtimes: bool,
    ) -> Result<Vec<Workspace>> {
        let mut normalized = Vec::with_capacity(workspaces.len());
        for workspace in workspaces {
            normalized.push(self.normalize(workspace, include_runtimes).await);
        }
        Ok(normalized)
    }

    /// Overlay the live status; persisted status is never trusted.
    ///
    /// The manager's own marks win. Without one, the registry is asked, so
    /// runtimes started or recovered directly through it are visible too.
    async fn normalize(&self, mut workspace: Workspace, include_runtimes: bool) -> Workspace {
        let cached = self.states.read().await.get(&workspace.id).copied();
        let status = match cached {
            Some(status) => status,
            None => self.runtimes.status(&workspace.id).await,
        };
        workspace.runtime = None;
        if status == WorkspaceStatus::Running && include_runtimes {
            match self.runtimes.get(&workspace.id).await {
                Ok(runtime) => workspace.runtime = Some(Runtime::from(&runtime)),
                Err(_) => error!(
                    workspace_id = %workspace.id,
                    "Workspace has RUNNING state but no runtime"
                ),
            }
        }
        workspace.status = status;
        workspace
    }
}
