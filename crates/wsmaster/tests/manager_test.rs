// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the workspace manager facade.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use wsmaster::config::Config;
use wsmaster::dao::{InMemoryAccountManager, InMemoryWorkspaceDao, WorkspaceDao};
use wsmaster::error::{Error, Result};
use wsmaster::event::{EventType, WorkspaceEvent};
use wsmaster::infrastructure::{MockInfrastructure, StartOptions};
use wsmaster::manager::WorkspaceUpdate;
use wsmaster::model::{
    CREATED_ATTRIBUTE_NAME, Environment, Recipe, Runtime, UPDATED_ATTRIBUTE_NAME, Workspace,
    WorkspaceConfig, WorkspaceStatus,
};
use wsmaster::service::WsMaster;
use wsmaster::subject::Subject;
use wsmaster::validator::WorkspaceValidator;

/// Accepts every configuration, leaving recipe checks to the registry.
struct AcceptAll;

impl WorkspaceValidator for AcceptAll {
    fn validate_config(&self, _config: &WorkspaceConfig) -> Result<()> {
        Ok(())
    }
}

/// Storage whose records claim a RUNNING runtime the registry never had.
#[derive(Default)]
struct StaleStatusDao {
    inner: InMemoryWorkspaceDao,
}

fn stale(mut workspace: Workspace) -> Workspace {
    workspace.status = WorkspaceStatus::Running;
    workspace.runtime = Some(Runtime {
        active_env: ENV_NAME.to_string(),
        owner: NAMESPACE.to_string(),
        machines: HashMap::new(),
    });
    workspace
}

#[async_trait]
impl WorkspaceDao for StaleStatusDao {
    async fn get(&self, id: &str) -> Result<Workspace> {
        self.inner.get(id).await.map(stale)
    }

    async fn get_by_name(&self, name: &str, namespace: &str) -> Result<Workspace> {
        self.inner.get_by_name(name, namespace).await.map(stale)
    }

    async fn create(&self, workspace: Workspace) -> Result<Workspace> {
        self.inner.create(workspace).await
    }

    async fn update(&self, workspace: Workspace) -> Result<Workspace> {
        self.inner.update(workspace).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.inner.remove(id).await
    }

    async fn get_workspaces(&self, user_id: &str) -> Result<Vec<Workspace>> {
        let workspaces = self.inner.get_workspaces(user_id).await?;
        Ok(workspaces.into_iter().map(stale).collect())
    }

    async fn get_by_namespace(&self, namespace: &str) -> Result<Vec<Workspace>> {
        let workspaces = self.inner.get_by_namespace(namespace).await?;
        Ok(workspaces.into_iter().map(stale).collect())
    }
}

/// Master whose validator accepts anything, so the registry does the
/// recipe checks.
async fn permissive_master(dao: Arc<InMemoryWorkspaceDao>) -> WsMaster {
    WsMaster::builder()
        .dao(dao)
        .accounts(Arc::new(InMemoryAccountManager::with_accounts([account()])))
        .infrastructure(Arc::new(MockInfrastructure::new()))
        .validator(Arc::new(AcceptAll))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

async fn create(fx: &MasterFixture) -> String {
    fx.manager()
        .create_workspace(config("dev-workspace"), NAMESPACE, HashMap::new())
        .await
        .unwrap()
        .id
}

async fn start_running(fx: &MasterFixture) -> String {
    let id = create(fx).await;
    fx.manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();
    wait_for_status(fx.manager(), &id, WorkspaceStatus::Running).await;
    id
}

// ============================================================================
// CRUD
// ============================================================================

#[tokio::test]
async fn test_create_workspace() {
    let mut fx = master(Arc::new(MockInfrastructure::new())).await;

    let workspace = fx
        .manager()
        .create_workspace(config("dev-workspace"), NAMESPACE, HashMap::new())
        .await
        .unwrap();

    assert!(workspace.id.starts_with("workspace"));
    assert_eq!(workspace.status, WorkspaceStatus::Stopped);
    assert_eq!(workspace.account.id, ACCOUNT_ID);
    assert!(workspace.attributes.contains_key(CREATED_ATTRIBUTE_NAME));
    assert!(!workspace.temporary);
    assert!(fx.dao.get(&workspace.id).await.is_ok());

    match fx.rx.try_recv().unwrap() {
        WorkspaceEvent::Created {
            workspace_id,
            namespace,
            name,
        } => {
            assert_eq!(workspace_id, workspace.id);
            assert_eq!(namespace, NAMESPACE);
            assert_eq!(name, "dev-workspace");
        }
        other => panic!("expected Created event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_rejects_invalid_config() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;

    let err = fx
        .manager()
        .create_workspace(config("x"), NAMESPACE, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let unsupported = WorkspaceConfig::new(
        "dev-workspace",
        ENV_NAME,
        Environment::new(Recipe::inline("compose", "text/plain", "services: {}")),
    );
    let err = fx
        .manager()
        .create_workspace(unsupported, NAMESPACE, HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(fx.dao.is_empty().await);
}

#[tokio::test]
async fn test_create_in_unknown_namespace() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;

    let err = fx
        .manager()
        .create_workspace(config("dev-workspace"), "nobody", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_get_workspace_by_composite_key() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = create(&fx).await;

    let by_id = fx.manager().get_workspace(&id).await.unwrap();
    let by_name = fx
        .manager()
        .get_workspace("user123:dev-workspace")
        .await
        .unwrap();
    assert_eq!(by_id, by_name);

    let by_subject = Subject::scope(
        Subject::new("user-id-1", NAMESPACE),
        fx.manager().get_workspace(":dev-workspace"),
    )
    .await
    .unwrap();
    assert_eq!(by_subject.id, id);

    assert!(matches!(
        fx.manager().get_workspace(":dev-workspace").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        fx.manager().get_workspace("user123:").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        fx.manager().get_workspace("user123:other").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_replaces_content() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = create(&fx).await;

    let mut attributes = HashMap::new();
    attributes.insert("stackId".to_string(), "java-default".to_string());
    let mut new_config = config("renamed-workspace");
    new_config.description = Some("updated".to_string());

    let updated = fx
        .manager()
        .update_workspace(
            &id,
            WorkspaceUpdate {
                config: new_config.clone(),
                attributes,
                temporary: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.config, new_config);
    assert!(updated.temporary);
    assert_eq!(updated.attributes["stackId"], "java-default");
    assert!(updated.attributes.contains_key(UPDATED_ATTRIBUTE_NAME));
    assert!(!updated.attributes.contains_key(CREATED_ATTRIBUTE_NAME));

    let err = fx
        .manager()
        .update_workspace(
            "missing",
            WorkspaceUpdate {
                config: config("dev-workspace"),
                attributes: HashMap::new(),
                temporary: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_remove_workspace() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = create(&fx).await;

    fx.manager().remove_workspace(&id).await.unwrap();
    assert!(fx.dao.is_empty().await);

    // Removing an unknown workspace is not an error.
    fx.manager().remove_workspace("missing").await.unwrap();
}

#[tokio::test]
async fn test_remove_running_workspace_conflicts() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = start_running(&fx).await;

    let err = fx.manager().remove_workspace(&id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(
        err.to_string(),
        format!(
            "The workspace '{}' is currently running and cannot be removed.",
            id
        )
    );
    assert!(fx.dao.get(&id).await.is_ok());
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_start_workspace() {
    let mut fx = master(Arc::new(MockInfrastructure::new().with_start_delay(50))).await;
    let id = create(&fx).await;

    let starting = fx
        .manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();
    assert_eq!(starting.status, WorkspaceStatus::Starting);
    assert!(starting.runtime.is_none());
    assert!(starting.attributes.contains_key(UPDATED_ATTRIBUTE_NAME));

    wait_for_status(fx.manager(), &id, WorkspaceStatus::Running).await;
    let running = fx.manager().get_workspace(&id).await.unwrap();
    let runtime = running.runtime.unwrap();
    assert_eq!(runtime.active_env, ENV_NAME);
    assert_eq!(runtime.owner, NAMESPACE);
    assert!(runtime.machines.contains_key("machine"));

    let first = next_status_event(&mut fx.rx).await;
    assert_eq!(first.event_type, EventType::Starting);
    let second = next_status_event(&mut fx.rx).await;
    assert_eq!(second.event_type, EventType::Running);
}

#[tokio::test]
async fn test_listing_overlays_status_and_runtime() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = start_running(&fx).await;

    let with_runtimes = fx.manager().get_workspaces(ACCOUNT_ID, true).await.unwrap();
    assert_eq!(with_runtimes.len(), 1);
    assert_eq!(with_runtimes[0].status, WorkspaceStatus::Running);
    assert!(with_runtimes[0].runtime.is_some());

    let without_runtimes = fx.manager().get_by_namespace(NAMESPACE, false).await.unwrap();
    assert_eq!(without_runtimes[0].id, id);
    assert_eq!(without_runtimes[0].status, WorkspaceStatus::Running);
    assert!(without_runtimes[0].runtime.is_none());

    // Stored copies never carry live status.
    assert_eq!(
        fx.dao.get(&id).await.unwrap().status,
        WorkspaceStatus::Stopped
    );
}

#[tokio::test]
async fn test_stale_stored_status_is_reported_stopped() {
    let dao = Arc::new(StaleStatusDao::default());
    let master = WsMaster::builder()
        .dao(dao.clone())
        .accounts(Arc::new(InMemoryAccountManager::with_accounts([account()])))
        .infrastructure(Arc::new(MockInfrastructure::new()))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
    let id = master
        .manager()
        .create_workspace(config("dev-workspace"), NAMESPACE, HashMap::new())
        .await
        .unwrap()
        .id;
    assert_eq!(dao.get(&id).await.unwrap().status, WorkspaceStatus::Running);

    let by_id = master.manager().get_workspace(&id).await.unwrap();
    assert_eq!(by_id.status, WorkspaceStatus::Stopped);
    assert!(by_id.runtime.is_none());

    let by_key = master
        .manager()
        .get_workspace("user123:dev-workspace")
        .await
        .unwrap();
    assert_eq!(by_key.status, WorkspaceStatus::Stopped);
    assert!(by_key.runtime.is_none());

    let listed = master.manager().get_workspaces(ACCOUNT_ID, true).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, WorkspaceStatus::Stopped);
    assert!(listed[0].runtime.is_none());

    let in_namespace = master.manager().get_by_namespace(NAMESPACE, true).await.unwrap();
    assert_eq!(in_namespace.len(), 1);
    assert_eq!(in_namespace[0].status, WorkspaceStatus::Stopped);
    assert!(in_namespace[0].runtime.is_none());
}

#[tokio::test]
async fn test_runtime_started_through_registry_is_visible() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = create(&fx).await;
    let stored = fx.dao.get(&id).await.unwrap();

    fx.master
        .runtimes()
        .start(&stored, ENV_NAME, StartOptions::new())
        .await
        .unwrap();

    let running = fx.manager().get_workspace(&id).await.unwrap();
    assert_eq!(running.status, WorkspaceStatus::Running);
    assert!(running.runtime.is_some());

    fx.manager()
        .stop_workspace(&id, StartOptions::new())
        .await
        .unwrap();
    wait_for_status(fx.manager(), &id, WorkspaceStatus::Stopped).await;
    assert!(!fx.master.runtimes().has_runtime(&id).await);
}

#[tokio::test]
async fn test_rejected_start_keeps_updated_attribute() {
    let dao = Arc::new(InMemoryWorkspaceDao::new());
    let master = permissive_master(dao.clone()).await;
    let unsupported = WorkspaceConfig::new(
        "dev-workspace",
        ENV_NAME,
        Environment::new(Recipe::inline("compose", "text/plain", "services: {}")),
    );
    let id = master
        .manager()
        .create_workspace(unsupported, NAMESPACE, HashMap::new())
        .await
        .unwrap()
        .id;

    let err = master
        .manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    let stored = dao.get(&id).await.unwrap();
    assert!(!stored.attributes.contains_key(UPDATED_ATTRIBUTE_NAME));
    assert_eq!(
        master.manager().get_workspace(&id).await.unwrap().status,
        WorkspaceStatus::Stopped
    );
}

#[tokio::test]
async fn test_double_start_conflicts() {
    let fx = master(Arc::new(MockInfrastructure::new().with_start_delay(50))).await;
    let id = create(&fx).await;

    fx.manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();
    let err = fx
        .manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_start_unknown_environment() {
    let infra = Arc::new(MockInfrastructure::new());
    let fx = master(infra.clone()).await;
    let id = create(&fx).await;

    let err = fx
        .manager()
        .start_workspace(&id, Some("missing-env"), StartOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(infra.prepare_count(), 0);

    // Nothing is left pending, so the default environment still starts.
    fx.manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();
    wait_for_status(fx.manager(), &id, WorkspaceStatus::Running).await;
}

#[tokio::test]
async fn test_failed_start_returns_to_stopped() {
    let mut fx = master(Arc::new(MockInfrastructure::failing())).await;
    let id = create(&fx).await;

    fx.manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();

    assert_eq!(
        next_status_event(&mut fx.rx).await.event_type,
        EventType::Starting
    );
    let failure = next_status_event(&mut fx.rx).await;
    assert_eq!(failure.event_type, EventType::Error);
    assert!(failure.error.unwrap().contains("Mock failure"));

    wait_for_status(fx.manager(), &id, WorkspaceStatus::Stopped).await;
    assert!(!fx.manager().runtimes().has_runtime(&id).await);
}

#[tokio::test]
async fn test_missing_source_fails_start() {
    let mut fx = master(Arc::new(MockInfrastructure::source_missing())).await;
    let id = create(&fx).await;

    fx.manager()
        .start_workspace(&id, None, StartOptions::new())
        .await
        .unwrap();

    next_status_event(&mut fx.rx).await;
    let failure = next_status_event(&mut fx.rx).await;
    assert_eq!(failure.event_type, EventType::Error);
    assert!(failure.error.unwrap().contains("Source not found"));
    wait_for_status(fx.manager(), &id, WorkspaceStatus::Stopped).await;
}

// ============================================================================
// Stop
// ============================================================================

#[tokio::test]
async fn test_stop_not_running_conflicts() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;
    let id = create(&fx).await;

    let err = fx
        .manager()
        .stop_workspace(&id, StartOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(
        err.to_string(),
        "Could not stop the workspace 'user123:dev-workspace' because its status is 'STOPPED'."
    );
}

#[tokio::test]
async fn test_stop_workspace() {
    let infra = Arc::new(MockInfrastructure::new());
    let fx = master(infra.clone()).await;
    let id = start_running(&fx).await;
    let started_at = fx.dao.get(&id).await.unwrap().attributes[UPDATED_ATTRIBUTE_NAME].clone();

    fx.manager()
        .stop_workspace(&id, StartOptions::new())
        .await
        .unwrap();

    wait_for_status(fx.manager(), &id, WorkspaceStatus::Stopped).await;
    let dao = fx.dao.clone();
    let stored_id = id.clone();
    eventually(move || {
        let dao = dao.clone();
        let id = stored_id.clone();
        let started_at = started_at.clone();
        async move {
            dao.get(&id)
                .await
                .is_ok_and(|ws| ws.attributes[UPDATED_ATTRIBUTE_NAME] != started_at)
        }
    })
    .await;
    assert_eq!(infra.running_count().await, 0);

    // Stopped workspaces can be removed.
    fx.manager().remove_workspace(&id).await.unwrap();
}

// ============================================================================
// Temporary workspaces
// ============================================================================

#[tokio::test]
async fn test_temporary_workspace_removed_after_stop() {
    let fx = master(Arc::new(MockInfrastructure::new())).await;

    let workspace = fx
        .manager()
        .start_workspace_from_config(config("temp-workspace"), NAMESPACE, true, StartOptions::new())
        .await
        .unwrap();
    assert!(workspace.temporary);
    assert_eq!(workspace.status, WorkspaceStatus::Starting);

    wait_for_status(fx.manager(), &workspace.id, WorkspaceStatus::Running).await;
    fx.manager()
        .stop_workspace(&workspace.id, StartOptions::new())
        .await
        .unwrap();

    let dao = fx.dao.clone();
    eventually(move || {
        let dao = dao.clone();
        async move { dao.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_temporary_workspace_removed_after_failed_start() {
    let fx = master(Arc::new(MockInfrastructure::failing())).await;

    fx.manager()
        .start_workspace_from_config(config("temp-workspace"), NAMESPACE, true, StartOptions::new())
        .await
        .unwrap();

    let dao = fx.dao.clone();
    eventually(move || {
        let dao = dao.clone();
        async move { dao.is_empty().await }
    })
    .await;
}

#[tokio::test]
async fn test_temporary_workspace_removed_when_start_is_rejected() {
    let dao = Arc::new(InMemoryWorkspaceDao::new());
    let master = permissive_master(dao.clone()).await;

    let unsupported = WorkspaceConfig::new(
        "temp-workspace",
        ENV_NAME,
        Environment::new(Recipe::inline("compose", "text/plain", "services: {}")),
    );
    let err = master
        .manager()
        .start_workspace_from_config(unsupported, NAMESPACE, true, StartOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(dao.is_empty().await);
}

#[tokio::test]
async fn test_persistent_workspace_kept_after_failed_start() {
    let fx = master(Arc::new(MockInfrastructure::failing())).await;

    let workspace = fx
        .manager()
        .start_workspace_from_config(
            config("dev-workspace"),
            NAMESPACE,
            false,
            StartOptions::new(),
        )
        .await
        .unwrap();

    wait_for_status(fx.manager(), &workspace.id, WorkspaceStatus::Stopped).await;
    assert!(fx.dao.get(&workspace.id).await.is_ok());
}

// ============================================================================
// Recovery / shutdown
// ============================================================================

#[tokio::test]
async fn test_master_recovers_live_runtimes() {
    let infra = Arc::new(MockInfrastructure::new());
    let previous = registry(infra.clone());
    previous
        .runtimes
        .start(&workspace("ws1"), ENV_NAME, StartOptions::new())
        .await
        .unwrap();

    let fx = master(infra.clone()).await;
    assert_eq!(
        fx.master.runtimes().status("ws1").await,
        WorkspaceStatus::Running
    );

    let without_recovery = master_with_config(
        infra,
        Config {
            recover_runtimes: false,
            ..Config::default()
        },
    )
    .await;
    assert!(!without_recovery.master.runtimes().has_runtime("ws1").await);
}

#[tokio::test]
async fn test_shutdown_stops_running_workspaces() {
    let infra = Arc::new(MockInfrastructure::new());
    let fx = master(infra.clone()).await;
    start_running(&fx).await;
    assert_eq!(infra.running_count().await, 1);

    let MasterFixture { master, .. } = fx;
    assert!(master.is_running());
    master.shutdown().await.unwrap();

    assert_eq!(infra.running_count().await, 0);
}
