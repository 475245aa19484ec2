// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for wsmaster.

use std::time::Duration;

/// Default number of concurrent lifecycle tasks on the shared pool.
pub const DEFAULT_POOL_SIZE: usize = 10;
/// Default bound on an infrastructure start.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(300);
/// Default bound on an infrastructure stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);
/// Default capacity of the lifecycle event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
/// Default time the shared pool gets to drain on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Workspace master configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of start/stop tasks running at once
    pub pool_size: usize,
    /// Time allowed for an infrastructure to bring a runtime up
    pub start_timeout: Duration,
    /// Time allowed for an infrastructure to tear a runtime down
    pub stop_timeout: Duration,
    /// Capacity of the broadcast channel carrying lifecycle events
    pub event_capacity: usize,
    /// Adopt runtimes the infrastructures still report as live on startup
    pub recover_runtimes: bool,
    /// Time the shared pool gets to finish in-flight tasks on shutdown
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            recover_runtimes: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pool_size = parse_var(&lookup, "WSMASTER_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                var: "WSMASTER_POOL_SIZE",
                value: "0".to_string(),
            });
        }

        let start_timeout = Duration::from_secs(parse_var(
            &lookup,
            "WSMASTER_START_TIMEOUT_SECS",
            DEFAULT_START_TIMEOUT.as_secs(),
        )?);
        let stop_timeout = Duration::from_secs(parse_var(
            &lookup,
            "WSMASTER_STOP_TIMEOUT_SECS",
            DEFAULT_STOP_TIMEOUT.as_secs(),
        )?);
        let event_capacity =
            parse_var(&lookup, "WSMASTER_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?;
        let shutdown_grace = Duration::from_secs(parse_var(
            &lookup,
            "WSMASTER_SHUTDOWN_GRACE_SECS",
            DEFAULT_SHUTDOWN_GRACE.as_secs(),
        )?);

        let recover_runtimes = match lookup("WSMASTER_RECOVER_RUNTIMES") {
            None => true,
            Some(v) => match v.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "WSMASTER_RECOVER_RUNTIMES",
                        value: v,
                    });
                }
            },
        };

        Ok(Self {
            pool_size,
            start_timeout,
            stop_timeout,
            event_capacity,
            recover_runtimes,
            shutdown_grace,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("Invalid value '{value}' for environment variable {var}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}
