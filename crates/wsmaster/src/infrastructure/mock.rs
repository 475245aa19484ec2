// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock infrastructure for testing.
//!
//! A simple infrastructure implementation that simulates runtimes
//! without actually provisioning containers or machines.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::context::{InternalRuntime, RuntimeContext};
use super::traits::*;
use crate::model::{Environment, MachineRuntime, RuntimeIdentity, ServerRuntime};

/// Attribute the mock fills in during `estimate` when a machine has none.
pub const MEMORY_LIMIT_ATTRIBUTE: &str = "memoryLimitBytes";
/// Memory limit assigned by `estimate` (2 GiB).
pub const DEFAULT_MEMORY_LIMIT_BYTES: &str = "2147483648";

const SUPPORTED_CHANNELS: &[&str] = &["terminal", "exec"];

type RuntimeMap = Arc<Mutex<HashMap<RuntimeIdentity, InternalRuntime>>>;

/// Mock infrastructure for testing.
///
/// Environments without declared machines get a single machine named
/// `machine` exposing server `server` at `http://localhost`.
pub struct MockInfrastructure {
    runtimes: RuntimeMap,
    prepare_calls: Arc<AtomicUsize>,
    recipe_types: Vec<String>,
    /// Optional delay to simulate start/stop time (in milliseconds)
    pub start_delay_ms: u64,
    /// If true, starts fail with `StartFailed`
    pub fail_start: bool,
    /// If true, starts fail because the project source cannot be fetched
    pub source_not_found: bool,
    /// If true, stops report `StopFailed` after tearing the runtime down
    pub fail_stop: bool,
    /// If true, starts never finish on their own.
    /// This is useful for testing timeout enforcement.
    pub never_complete: bool,
}

impl Default for MockInfrastructure {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInfrastructure {
    /// Create a new mock infrastructure running recipe type "test".
    pub fn new() -> Self {
        Self {
            runtimes: Arc::new(Mutex::new(HashMap::new())),
            prepare_calls: Arc::new(AtomicUsize::new(0)),
            recipe_types: vec!["test".to_string()],
            start_delay_ms: 10,
            fail_start: false,
            source_not_found: false,
            fail_stop: false,
            never_complete: false,
        }
    }

    /// Create a mock infrastructure whose starts fail.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Create a mock infrastructure whose starts fail on a missing source.
    pub fn source_missing() -> Self {
        Self {
            source_not_found: true,
            ..Self::new()
        }
    }

    /// Create a mock infrastructure whose starts never complete.
    pub fn never_completing() -> Self {
        Self {
            start_delay_ms: 0,
            never_complete: true,
            ..Self::new()
        }
    }

    /// Set the simulated start/stop delay.
    pub fn with_start_delay(mut self, delay_ms: u64) -> Self {
        self.start_delay_ms = delay_ms;
        self
    }

    /// Make stops report a failure.
    pub fn with_stop_failure(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Replace the recipe types this infrastructure runs.
    pub fn with_recipe_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipe_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Number of `prepare` calls so far.
    pub fn prepare_count(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    /// Number of runtimes currently up.
    pub async fn running_count(&self) -> usize {
        self.runtimes.lock().await.len()
    }
}

#[async_trait]
impl RuntimeInfrastructure for MockInfrastructure {
    fn name(&self) -> &str {
        "mock"
    }

    fn recipe_types(&self) -> &[String] {
        &self.recipe_types
    }

    async fn estimate(&self, environment: &Environment) -> Result<Environment> {
        let recipe = &environment.recipe;
        if !self.recipe_types.contains(&recipe.recipe_type) {
            return Err(InfrastructureError::InvalidEnvironment(format!(
                "Recipe type '{}' is not supported",
                recipe.recipe_type
            )));
        }
        if recipe.content.is_none() && recipe.location.is_none() {
            return Err(InfrastructureError::InvalidEnvironment(
                "Recipe has neither content nor location".to_string(),
            ));
        }

        let mut estimated = environment.clone();
        for machine in estimated.machines.values_mut() {
            machine
                .attributes
                .entry(MEMORY_LIMIT_ATTRIBUTE.to_string())
                .or_insert_with(|| DEFAULT_MEMORY_LIMIT_BYTES.to_string());
        }
        Ok(estimated)
    }

    async fn prepare(
        &self,
        identity: RuntimeIdentity,
        environment: Environment,
    ) -> Result<Arc<RuntimeContext>> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);

        let backend = MockBackend {
            runtimes: self.runtimes.clone(),
            delay: Duration::from_millis(self.start_delay_ms),
            fail_start: self.fail_start,
            source_not_found: self.source_not_found,
            fail_stop: self.fail_stop,
            never_complete: self.never_complete,
        };
        Ok(Arc::new(RuntimeContext::new(
            identity,
            environment,
            self.name(),
            Box::new(backend),
        )))
    }

    async fn identities(&self) -> Result<Vec<RuntimeIdentity>> {
        Ok(self.runtimes.lock().await.keys().cloned().collect())
    }

    async fn runtime(&self, identity: &RuntimeIdentity) -> Option<InternalRuntime> {
        self.runtimes.lock().await.get(identity).cloned()
    }
}

struct MockBackend {
    runtimes: RuntimeMap,
    delay: Duration,
    fail_start: bool,
    source_not_found: bool,
    fail_stop: bool,
    never_complete: bool,
}

impl MockBackend {
    fn machines(environment: &Environment) -> HashMap<String, MachineRuntime> {
        if environment.machines.is_empty() {
            let mut servers = HashMap::new();
            servers.insert("server".to_string(), ServerRuntime::new("http://localhost"));
            let mut machines = HashMap::new();
            machines.insert(
                "machine".to_string(),
                MachineRuntime {
                    servers,
                    properties: HashMap::new(),
                },
            );
            return machines;
        }

        environment
            .machines
            .iter()
            .map(|(name, config)| {
                let servers = config
                    .servers
                    .iter()
                    .map(|(reference, server)| {
                        let port = server.port.split('/').next().unwrap_or_default();
                        let url = format!(
                            "{}://localhost:{}{}",
                            server.protocol,
                            port,
                            server.path.as_deref().unwrap_or_default()
                        );
                        (reference.clone(), ServerRuntime::new(url))
                    })
                    .collect();
                (
                    name.clone(),
                    MachineRuntime {
                        servers,
                        properties: config.attributes.clone(),
                    },
                )
            })
            .collect()
    }
}

#[async_trait]
impl RuntimeBackend for MockBackend {
    async fn internal_start(
        &self,
        context: &Arc<RuntimeContext>,
        _options: &StartOptions,
    ) -> Result<InternalRuntime> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.never_complete {
            std::future::pending::<()>().await;
        }

        let environment = context.environment();
        if self.source_not_found {
            let machine = environment
                .machines
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "machine".to_string());
            let location = environment
                .recipe
                .location
                .clone()
                .unwrap_or_else(|| "project source".to_string());
            return Err(InfrastructureError::Machine {
                machine,
                source: Box::new(InfrastructureError::SourceNotFound(location)),
            });
        }
        if self.fail_start {
            return Err(InfrastructureError::StartFailed("Mock failure".to_string()));
        }

        let mut properties = HashMap::new();
        properties.insert("infrastructure".to_string(), "mock".to_string());
        let runtime = InternalRuntime::new(context.clone(), Self::machines(environment), properties);

        self.runtimes
            .lock()
            .await
            .insert(context.identity().clone(), runtime.clone());
        Ok(runtime)
    }

    async fn internal_stop(&self, context: &RuntimeContext, _options: &StartOptions) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.runtimes.lock().await.remove(context.identity());
        if self.fail_stop {
            return Err(InfrastructureError::StopFailed("Mock failure".to_string()));
        }
        Ok(())
    }

    async fn channel(&self, identity: &RuntimeIdentity, name: &str) -> Result<Url> {
        if !SUPPORTED_CHANNELS.contains(&name) {
            return Err(InfrastructureError::NotSupported(format!(
                "Runtime channel '{}' is not supported",
                name
            )));
        }
        let raw = format!(
            "ws://localhost:4411/{}/{}?token={}",
            identity.workspace_id(),
            name,
            uuid::Uuid::new_v4().simple()
        );
        Url::parse(&raw).map_err(|e| InfrastructureError::Other(e.to_string()))
    }
}
