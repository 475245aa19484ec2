// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace data model.
//!
//! Persisted configuration types (workspace, environment, recipe, machine)
//! plus the live runtime view that is overlaid on them at read time.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute holding the creation time in epoch milliseconds.
pub const CREATED_ATTRIBUTE_NAME: &str = "created";
/// Attribute holding the last update/start/stop time in epoch milliseconds.
pub const UPDATED_ATTRIBUTE_NAME: &str = "updated";

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceStatus {
    /// No runtime exists.
    Stopped,
    /// Runtime is being brought up.
    Starting,
    /// Runtime is up.
    Running,
    /// Runtime is being torn down.
    Stopping,
}

impl WorkspaceStatus {
    /// Get the status string
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceStatus::Stopped => "STOPPED",
            WorkspaceStatus::Starting => "STARTING",
            WorkspaceStatus::Running => "RUNNING",
            WorkspaceStatus::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one running instance of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeIdentity {
    workspace_id: String,
    env_name: String,
    owner: String,
}

impl RuntimeIdentity {
    /// Create a new identity.
    pub fn new(
        workspace_id: impl Into<String>,
        env_name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            env_name: env_name.into(),
            owner: owner.into(),
        }
    }

    /// Workspace ID
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Environment name the runtime was started with
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Owner of the runtime
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.workspace_id, self.env_name, self.owner)
    }
}

/// Build/run description used by an infrastructure to materialize machines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe type (e.g. "dockerfile", "compose"); selects the infrastructure.
    #[serde(rename = "type")]
    pub recipe_type: String,
    /// MIME type of the content
    pub content_type: String,
    /// Inline recipe content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Location to fetch the recipe from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Recipe {
    /// Create a recipe with inline content.
    pub fn inline(
        recipe_type: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            recipe_type: recipe_type.into(),
            content_type: content_type.into(),
            content: Some(content.into()),
            location: None,
        }
    }
}

/// A server a machine exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port, optionally suffixed with `/tcp` or `/udp`
    pub port: String,
    /// Protocol (e.g. "http")
    pub protocol: String,
    /// Path component of the server URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Declared configuration of one machine in an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Installer IDs to run on the machine
    #[serde(default)]
    pub installers: Vec<String>,
    /// Servers by reference name
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
    /// Free-form attributes (e.g. `memoryLimitBytes`)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// One named configuration a workspace can be started with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Recipe for the environment
    pub recipe: Recipe,
    /// Machines by name
    #[serde(default)]
    pub machines: HashMap<String, MachineConfig>,
}

impl Environment {
    /// Create an environment from a recipe with no declared machines.
    pub fn new(recipe: Recipe) -> Self {
        Self {
            recipe,
            machines: HashMap::new(),
        }
    }

    /// Add a machine declaration.
    pub fn with_machine(mut self, name: impl Into<String>, machine: MachineConfig) -> Self {
        self.machines.insert(name.into(), machine);
        self
    }
}

/// A command declared in a workspace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Command line to run
    pub command_line: String,
    /// Command type (e.g. "custom", "mvn")
    #[serde(rename = "type")]
    pub command_type: String,
    /// Free-form attributes
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Persisted configuration of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace name, unique within a namespace
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Environment used when none is requested
    pub default_env: String,
    /// Environments by name
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
    /// Declared commands
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl WorkspaceConfig {
    /// Create a config with a single environment that is also the default.
    pub fn new(name: impl Into<String>, env_name: impl Into<String>, env: Environment) -> Self {
        let env_name = env_name.into();
        let mut environments = HashMap::new();
        environments.insert(env_name.clone(), env);
        Self {
            name: name.into(),
            description: None,
            default_env: env_name,
            environments,
            commands: Vec::new(),
        }
    }
}

/// Account owning a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: String,
    /// Account name, used as the workspace namespace
    pub name: String,
    /// Account type (e.g. "personal")
    #[serde(rename = "type")]
    pub account_type: String,
}

impl Account {
    /// Create a new account.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        account_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            account_type: account_type.into(),
        }
    }
}

/// Status of a server inside a running machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Server responds.
    Running,
    /// Server does not respond.
    Stopped,
    /// Server status is not known yet.
    Unknown,
}

/// A server exposed by a running machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRuntime {
    /// Public URL of the server
    pub url: String,
    /// Current status
    pub status: ServerStatus,
}

impl ServerRuntime {
    /// Create a server with unknown status.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ServerStatus::Unknown,
        }
    }
}

/// One running machine of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRuntime {
    /// Servers by reference name
    #[serde(default)]
    pub servers: HashMap<String, ServerRuntime>,
    /// Infrastructure specific properties
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Runtime view attached to a workspace returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    /// Environment the runtime was started with
    pub active_env: String,
    /// Owner of the runtime
    pub owner: String,
    /// Machines by name
    pub machines: HashMap<String, MachineRuntime>,
}

/// A user's workspace: persisted configuration plus derived runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Workspace ID
    pub id: String,
    /// Account the workspace belongs to
    pub account: Account,
    /// Configuration
    pub config: WorkspaceConfig,
    /// Free-form attributes (`created`, `updated`, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Temporary workspaces are removed once stopped or failed to start
    #[serde(default)]
    pub temporary: bool,
    /// Derived status; never persisted as anything but STOPPED
    pub status: WorkspaceStatus,
    /// Derived runtime, present only for running workspaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
}

impl Workspace {
    /// Create a stopped workspace with a freshly generated ID.
    pub fn new(account: Account, config: WorkspaceConfig) -> Self {
        Self::with_id(generate_workspace_id(), account, config)
    }

    /// Create a stopped workspace with the given ID.
    pub fn with_id(id: impl Into<String>, account: Account, config: WorkspaceConfig) -> Self {
        Self {
            id: id.into(),
            account,
            config,
            attributes: HashMap::new(),
            temporary: false,
            status: WorkspaceStatus::Stopped,
            runtime: None,
        }
    }

    /// Namespace (account name) the workspace name is unique in
    pub fn namespace(&self) -> &str {
        &self.account.name
    }

    /// `namespace:name` form used in messages and logs
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.namespace(), self.config.name)
    }
}

/// Generate a workspace ID: `workspace` followed by 16 lowercase alphanumerics.
pub fn generate_workspace_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("workspace{}", &simple[..16])
}

/// Current time in epoch milliseconds, as stored in timestamp attributes.
pub fn now_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
