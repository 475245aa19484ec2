// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for wsmaster integration tests.
//!
//! Provides workspace fixtures, registry/master setup and event helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use wsmaster::config::Config;
use wsmaster::dao::{InMemoryAccountManager, InMemoryWorkspaceDao};
use wsmaster::event::{BroadcastEventService, WorkspaceEvent, WorkspaceStatusEvent};
use wsmaster::infrastructure::{MockInfrastructure, RuntimeInfrastructure};
use wsmaster::manager::WorkspaceManager;
use wsmaster::model::{Account, Environment, Recipe, Workspace, WorkspaceConfig, WorkspaceStatus};
use wsmaster::pool::SharedPool;
use wsmaster::runtimes::WorkspaceRuntimes;
use wsmaster::service::WsMaster;

pub const NAMESPACE: &str = "user123";
pub const ACCOUNT_ID: &str = "account123";
pub const ENV_NAME: &str = "dev-env";

/// How long helpers wait for asynchronous outcomes.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn account() -> Account {
    Account::new(ACCOUNT_ID, NAMESPACE, "personal")
}

pub fn environment() -> Environment {
    Environment::new(Recipe::inline("test", "text/plain", "FROM scratch"))
}

pub fn config(name: &str) -> WorkspaceConfig {
    WorkspaceConfig::new(name, ENV_NAME, environment())
}

pub fn workspace(id: &str) -> Workspace {
    Workspace::with_id(id, account(), config("dev-workspace"))
}

/// Workspace with a name of its own, for tests running several at once.
pub fn named_workspace(id: &str) -> Workspace {
    Workspace::with_id(id, account(), config(&format!("workspace-{}", id)))
}

/// Registry over a single infrastructure plus a subscription to its events.
pub struct RegistryFixture {
    pub runtimes: WorkspaceRuntimes,
    pub events: BroadcastEventService,
    pub rx: broadcast::Receiver<WorkspaceEvent>,
}

pub fn registry(infra: Arc<MockInfrastructure>) -> RegistryFixture {
    registry_with_timeouts(infra, Duration::from_secs(30), Duration::from_secs(30))
}

pub fn registry_with_timeouts(
    infra: Arc<MockInfrastructure>,
    start_timeout: Duration,
    stop_timeout: Duration,
) -> RegistryFixture {
    build_registry(infra, SharedPool::new(8), start_timeout, stop_timeout)
}

/// Registry running its tasks on `pool`, so tests can close it.
pub fn registry_with_pool(infra: Arc<MockInfrastructure>, pool: SharedPool) -> RegistryFixture {
    build_registry(infra, pool, Duration::from_secs(30), Duration::from_secs(30))
}

fn build_registry(
    infra: Arc<MockInfrastructure>,
    pool: SharedPool,
    start_timeout: Duration,
    stop_timeout: Duration,
) -> RegistryFixture {
    let events = BroadcastEventService::new(256);
    let rx = events.subscribe();
    let runtimes = WorkspaceRuntimes::new(
        vec![infra as Arc<dyn RuntimeInfrastructure>],
        Arc::new(events.clone()),
        pool,
    )
    .with_timeouts(start_timeout, stop_timeout);
    RegistryFixture {
        runtimes,
        events,
        rx,
    }
}

/// Master over a single infrastructure with in-memory persistence.
pub struct MasterFixture {
    pub master: WsMaster,
    pub dao: Arc<InMemoryWorkspaceDao>,
    pub rx: broadcast::Receiver<WorkspaceEvent>,
}

impl MasterFixture {
    pub fn manager(&self) -> &WorkspaceManager {
        self.master.manager()
    }
}

pub async fn master(infra: Arc<MockInfrastructure>) -> MasterFixture {
    master_with_config(infra, Config::default()).await
}

pub async fn master_with_config(infra: Arc<MockInfrastructure>, config: Config) -> MasterFixture {
    let dao = Arc::new(InMemoryWorkspaceDao::new());
    let master = WsMaster::builder()
        .dao(dao.clone())
        .accounts(Arc::new(InMemoryAccountManager::with_accounts([account()])))
        .infrastructure(infra)
        .config(config)
        .build()
        .expect("complete builder")
        .start()
        .await
        .expect("master starts");
    let rx = master.subscribe().expect("broadcast events");
    MasterFixture { master, dao, rx }
}

/// Status events already published, in order.
pub fn drain_status_events(
    rx: &mut broadcast::Receiver<WorkspaceEvent>,
) -> Vec<WorkspaceStatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let WorkspaceEvent::Status(status) = event {
            events.push(status);
        }
    }
    events
}

/// Next status event, waiting up to [`WAIT`].
pub async fn next_status_event(
    rx: &mut broadcast::Receiver<WorkspaceEvent>,
) -> WorkspaceStatusEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(WorkspaceEvent::Status(status)) => return status,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {}", e),
            }
        }
    })
    .await
    .expect("status event in time")
}

/// Poll the manager until the workspace reports `status`.
pub async fn wait_for_status(manager: &WorkspaceManager, id: &str, status: WorkspaceStatus) {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(workspace) = manager.get_workspace(id).await
                && workspace.status == status
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("workspace '{}' never reached {}", id, status));
}

/// Poll until `check` holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}
