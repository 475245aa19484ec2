// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for wsmaster.

use thiserror::Error;

use crate::config::ConfigError;
use crate::infrastructure::InfrastructureError;

/// Workspace master errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Workspace, runtime, account or environment does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Operation is invalid for the current state.
    #[error("{0}")]
    Conflict(String),

    /// Workspace configuration or request failed validation.
    #[error("{0}")]
    Validation(String),

    /// The infrastructure does not support the requested capability.
    #[error("{0}")]
    NotSupported(String),

    /// Infrastructure failed during prepare, start or stop.
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The shared pool no longer accepts tasks.
    #[error("Shared pool is closed")]
    PoolClosed,

    /// A pool task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotSupported(_) => "NOT_SUPPORTED",
            Self::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::PoolClosed => "POOL_CLOSED",
            Self::TaskFailed(_) => "TASK_FAILED",
        }
    }

    /// Whether the causal chain contains a missing project source.
    ///
    /// Such failures are expected and user-correctable, so they are reported
    /// through lifecycle events only and never logged as errors.
    pub fn is_caused_by_source_not_found(&self) -> bool {
        // `transparent` forwards `source()` past the wrapped error, so the
        // walk starts at the infrastructure error itself.
        let mut current: Option<&(dyn std::error::Error + 'static)> = match self {
            Self::Infrastructure(inner) => Some(inner),
            _ => None,
        };
        while let Some(err) = current {
            // Machine failures keep their cause boxed.
            let infra = err
                .downcast_ref::<InfrastructureError>()
                .or_else(|| err.downcast_ref::<Box<InfrastructureError>>().map(|b| &**b));
            if let Some(InfrastructureError::SourceNotFound(_)) = infra {
                return true;
            }
            current = match infra {
                Some(infra) => std::error::Error::source(infra),
                None => err.source(),
            };
        }
        false
    }
}

/// Result type using wsmaster Error.
pub type Result<T> = std::result::Result<T, Error>;
