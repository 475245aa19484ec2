// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence collaborators.
//!
//! Workspaces and accounts are reached only through these traits. The
//! in-memory implementations back the binary and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{Account, Workspace, WorkspaceStatus};

/// Workspace storage.
///
/// Stored workspaces always carry status STOPPED and no runtime; the live
/// state is overlaid by the manager.
#[async_trait]
pub trait WorkspaceDao: Send + Sync {
    /// Workspace by ID. `NotFound` when unknown.
    async fn get(&self, id: &str) -> Result<Workspace>;

    /// Workspace by name within a namespace. `NotFound` when unknown.
    async fn get_by_name(&self, name: &str, namespace: &str) -> Result<Workspace>;

    /// Store a new workspace. `Conflict` on ID or name collision.
    async fn create(&self, workspace: Workspace) -> Result<Workspace>;

    /// Replace an existing workspace. `NotFound` when unknown, `Conflict` on
    /// name collision.
    async fn update(&self, workspace: Workspace) -> Result<Workspace>;

    /// Remove a workspace. Unknown IDs are ignored.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Workspaces the user can access.
    async fn get_workspaces(&self, user_id: &str) -> Result<Vec<Workspace>>;

    /// Workspaces in a namespace.
    async fn get_by_namespace(&self, namespace: &str) -> Result<Vec<Workspace>>;
}

/// Account lookup.
#[async_trait]
pub trait AccountManager: Send + Sync {
    /// Account by name. `NotFound` when unknown.
    async fn get_by_name(&self, name: &str) -> Result<Account>;
}

/// In-memory workspace storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspaceDao {
    workspaces: Arc<RwLock<HashMap<String, Workspace>>>,
}

impl InMemoryWorkspaceDao {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored workspaces.
    pub async fn len(&self) -> usize {
        self.workspaces.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.workspaces.read().await.is_empty()
    }
}

fn stored(mut workspace: Workspace) -> Workspace {
    workspace.status = WorkspaceStatus::Stopped;
    workspace.runtime = None;
    workspace
}

fn name_conflict(workspace: &Workspace) -> Error {
    Error::Conflict(format!(
        "Workspace with name '{}' already exists in namespace '{}'",
        workspace.config.name,
        workspace.namespace()
    ))
}

fn name_taken(workspaces: &HashMap<String, Workspace>, candidate: &Workspace) -> bool {
    workspaces.values().any(|existing| {
        existing.id != candidate.id
            && existing.config.name == candidate.config.name
            && existing.namespace() == candidate.namespace()
    })
}

#[async_trait]
impl WorkspaceDao for InMemoryWorkspaceDao {
    async fn get(&self, id: &str) -> Result<Workspace> {
        self.workspaces
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Workspace with id '{}' doesn't exist", id)))
    }

    async fn get_by_name(&self, name: &str, namespace: &str) -> Result<Workspace> {
        self.workspaces
            .read()
            .await
            .values()
            .find(|ws| ws.config.name == name && ws.namespace() == namespace)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Workspace with name '{}' in namespace '{}' doesn't exist",
                    name, namespace
                ))
            })
    }

    async fn create(&self, workspace: Workspace) -> Result<Workspace> {
        let mut workspaces = self.workspaces.write().await;
        if workspaces.contains_key(&workspace.id) {
            return Err(Error::Conflict(format!(
                "Workspace with id '{}' already exists",
                workspace.id
            )));
        }
        if name_taken(&workspaces, &workspace) {
            return Err(name_conflict(&workspace));
        }
        let workspace = stored(workspace);
        workspaces.insert(workspace.id.clone(), workspace.clone());
        Ok(workspace)
    }

    async fn update(&self, workspace: Workspace) -> Result<Workspace> {
        let mut workspaces = self.workspaces.write().await;
        if !workspaces.contains_key(&workspace.id) {
            return Err(Error::NotFound(format!(
                "Workspace with id '{}' doesn't exist",
                workspace.id
            )));
        }
        if name_taken(&workspaces, &workspace) {
            return Err(name_conflict(&workspace));
        }
        let workspace = stored(workspace);
        workspaces.insert(workspace.id.clone(), workspace.clone());
        Ok(workspace)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.workspaces.write().await.remove(id);
        Ok(())
    }

    async fn get_workspaces(&self, user_id: &str) -> Result<Vec<Workspace>> {
        Ok(self
            .workspaces
            .read()
            .await
            .values()
            .filter(|ws| ws.account.id == user_id || ws.account.name == user_id)
            .cloned()
            .collect())
    }

    async fn get_by_namespace(&self, namespace: &str) -> Result<Vec<Workspace>> {
        Ok(self
            .workspaces
            .read()
            .await
            .values()
            .filter(|ws| ws.namespace() == namespace)
            .cloned()
            .collect())
    }
}

/// In-memory account lookup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountManager {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountManager {
    /// Create a lookup with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lookup holding the given accounts.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.name.clone(), account))
            .collect();
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }

    /// Add or replace an account.
    pub async fn add(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.name.clone(), account);
    }
}

#[async_trait]
impl AccountManager for InMemoryAccountManager {
    async fn get_by_name(&self, name: &str) -> Result<Account> {
        self.accounts
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Account '{}' doesn't exist", name)))
    }
}
