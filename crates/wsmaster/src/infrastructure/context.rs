// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime context and the live runtime it produces.
//!
//! ```text
//!   STOPPED ──start()──► STARTING ──ok──► RUNNING ──stop()──► STOPPING ──► STOPPED
//!      ▲                    │
//!      └──────failure───────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::traits::{InfrastructureError, RuntimeBackend, StartOptions};
use crate::error::{Error, Result};
use crate::model::{Environment, MachineRuntime, Runtime, RuntimeIdentity, WorkspaceStatus};

/// State machine for one runtime instance.
///
/// Created STOPPED by an infrastructure's `prepare`. Its state changes only
/// through [`start`](Self::start) and [`stop`](Self::stop).
pub struct RuntimeContext {
    identity: RuntimeIdentity,
    environment: Environment,
    infrastructure: String,
    backend: Box<dyn RuntimeBackend>,
    state: Mutex<WorkspaceStatus>,
    channels: Mutex<HashMap<String, Url>>,
}

impl RuntimeContext {
    /// Create a stopped context.
    pub fn new(
        identity: RuntimeIdentity,
        environment: Environment,
        infrastructure: impl Into<String>,
        backend: Box<dyn RuntimeBackend>,
    ) -> Self {
        Self {
            identity,
            environment,
            infrastructure: infrastructure.into(),
            backend,
            state: Mutex::new(WorkspaceStatus::Stopped),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Identity of the runtime
    pub fn identity(&self) -> &RuntimeIdentity {
        &self.identity
    }

    /// Environment the context was prepared with
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Name of the infrastructure that created the context
    pub fn infrastructure(&self) -> &str {
        &self.infrastructure
    }

    /// Current state
    pub async fn state(&self) -> WorkspaceStatus {
        *self.state.lock().await
    }

    /// Start the runtime.
    ///
    /// Fails with `Conflict` unless the context is STOPPED. A failed start
    /// leaves the context STOPPED.
    pub async fn start(self: &Arc<Self>, options: &StartOptions) -> Result<InternalRuntime> {
        {
            let mut state = self.state.lock().await;
            if *state != WorkspaceStatus::Stopped {
                return Err(Error::Conflict(format!(
                    "Runtime of workspace '{}' is not STOPPED, its status is '{}'",
                    self.identity.workspace_id(),
                    *state
                )));
            }
            *state = WorkspaceStatus::Starting;
        }

        match self.backend.internal_start(self, options).await {
            Ok(runtime) => {
                *self.state.lock().await = WorkspaceStatus::Running;
                debug!(workspace_id = %self.identity.workspace_id(), "Runtime context started");
                Ok(runtime)
            }
            Err(e) => {
                *self.state.lock().await = WorkspaceStatus::Stopped;
                Err(e.into())
            }
        }
    }

    /// Stop the runtime.
    ///
    /// Fails with `Conflict` if already STOPPED or STOPPING. The context is
    /// STOPPED afterwards even when the backend reports an error.
    pub async fn stop(&self, options: &StartOptions) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, WorkspaceStatus::Stopped | WorkspaceStatus::Stopping) {
                return Err(Error::Conflict(format!(
                    "Runtime of workspace '{}' is already {}",
                    self.identity.workspace_id(),
                    *state
                )));
            }
            *state = WorkspaceStatus::Stopping;
        }

        let result = self.backend.internal_stop(self, options).await;
        *self.state.lock().await = WorkspaceStatus::Stopped;
        self.channels.lock().await.clear();
        debug!(workspace_id = %self.identity.workspace_id(), "Runtime context stopped");
        result.map_err(Error::from)
    }

    /// URL of a named runtime channel.
    ///
    /// The first lookup asks the backend; later lookups return the cached URL.
    pub async fn runtime_channel(&self, name: &str) -> Result<Url> {
        let mut channels = self.channels.lock().await;
        if let Some(url) = channels.get(name) {
            return Ok(url.clone());
        }
        let url = self
            .backend
            .channel(&self.identity, name)
            .await
            .map_err(|e| match e {
                InfrastructureError::NotSupported(msg) => Error::NotSupported(msg),
                other => Error::from(other),
            })?;
        channels.insert(name.to_string(), url.clone());
        Ok(url)
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("identity", &self.identity)
            .field("infrastructure", &self.infrastructure)
            .finish_non_exhaustive()
    }
}

/// Live view of a started workspace.
#[derive(Clone)]
pub struct InternalRuntime {
    identity: RuntimeIdentity,
    machines: HashMap<String, MachineRuntime>,
    properties: HashMap<String, String>,
    context: Arc<RuntimeContext>,
}

impl InternalRuntime {
    /// Create a runtime produced by `context`.
    pub fn new(
        context: Arc<RuntimeContext>,
        machines: HashMap<String, MachineRuntime>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            identity: context.identity().clone(),
            machines,
            properties,
            context,
        }
    }

    /// Identity of the runtime
    pub fn identity(&self) -> &RuntimeIdentity {
        &self.identity
    }

    /// Running machines by name
    pub fn machines(&self) -> &HashMap<String, MachineRuntime> {
        &self.machines
    }

    /// Infrastructure specific properties
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Environment the runtime was started with
    pub fn active_env(&self) -> &str {
        self.identity.env_name()
    }

    /// Owner of the runtime
    pub fn owner(&self) -> &str {
        self.identity.owner()
    }

    /// Context that produced this runtime
    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }
}

impl PartialEq for InternalRuntime {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.machines == other.machines
            && self.properties == other.properties
    }
}

impl Eq for InternalRuntime {}

impl fmt::Debug for InternalRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalRuntime")
            .field("identity", &self.identity)
            .field("machines", &self.machines)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl From<&InternalRuntime> for Runtime {
    fn from(runtime: &InternalRuntime) -> Self {
        Runtime {
            active_env: runtime.active_env().to_string(),
            owner: runtime.owner().to_string(),
            machines: runtime.machines().clone(),
        }
    }
}
