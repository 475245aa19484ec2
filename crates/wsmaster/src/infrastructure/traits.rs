// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure trait definitions.
//!
//! Defines the abstract interface for runtime infrastructures.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::context::{InternalRuntime, RuntimeContext};
use crate::model::{Environment, RuntimeIdentity};

/// Errors from infrastructure operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfrastructureError {
    /// The environment cannot be run by this infrastructure.
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// The infrastructure does not support the operation.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A project source could not be fetched.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Runtime failed to start.
    #[error("Runtime start failed: {0}")]
    StartFailed(String),

    /// Runtime failed to stop.
    #[error("Runtime stop failed: {0}")]
    StopFailed(String),

    /// A machine of the runtime failed.
    #[error("Machine '{machine}' failed: {source}")]
    Machine {
        /// Machine name.
        machine: String,
        /// Underlying cause.
        #[source]
        source: Box<InfrastructureError>,
    },

    /// Operation did not finish in time.
    #[error("Runtime {operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        /// Operation that timed out ("start" or "stop").
        operation: &'static str,
        /// Bound that was exceeded.
        timeout: Duration,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for infrastructure operations.
pub type Result<T> = std::result::Result<T, InfrastructureError>;

/// Free-form options passed through start and stop (e.g. `debug-workspace-start`).
pub type StartOptions = HashMap<String, String>;

/// Trait for runtime infrastructures.
///
/// An infrastructure is selected by the recipe type of the environment being
/// started. It never tracks workspace status itself; the returned context
/// carries the state machine and the registry owns the live view.
#[async_trait]
pub trait RuntimeInfrastructure: Send + Sync {
    /// Infrastructure identifier (e.g. "docker", "openshift")
    fn name(&self) -> &str;

    /// Recipe types this infrastructure can run.
    fn recipe_types(&self) -> &[String];

    /// Validate the environment and fill in defaults (e.g. memory limits).
    async fn estimate(&self, environment: &Environment) -> Result<Environment>;

    /// Create a stopped runtime context for the identity.
    async fn prepare(
        &self,
        identity: RuntimeIdentity,
        environment: Environment,
    ) -> Result<Arc<RuntimeContext>>;

    /// Identities of runtimes this infrastructure currently runs.
    async fn identities(&self) -> Result<Vec<RuntimeIdentity>> {
        Err(InfrastructureError::NotSupported(format!(
            "Infrastructure '{}' cannot list its runtimes",
            self.name()
        )))
    }

    /// Live runtime for an identity reported by [`identities`](Self::identities).
    async fn runtime(&self, identity: &RuntimeIdentity) -> Option<InternalRuntime> {
        let _ = identity;
        None
    }
}

/// Infrastructure-specific half of a [`RuntimeContext`].
///
/// Implementations only do the work; the context guards the transitions.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    /// Bring the runtime up and describe what is running.
    async fn internal_start(
        &self,
        context: &Arc<RuntimeContext>,
        options: &StartOptions,
    ) -> Result<InternalRuntime>;

    /// Tear the runtime down.
    async fn internal_stop(&self, context: &RuntimeContext, options: &StartOptions) -> Result<()>;

    /// URL of a named runtime channel (e.g. "terminal").
    async fn channel(&self, identity: &RuntimeIdentity, name: &str) -> Result<Url> {
        let _ = identity;
        Err(InfrastructureError::NotSupported(format!(
            "Runtime channel '{}' is not supported",
            name
        )))
    }
}
