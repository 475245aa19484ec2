// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspace configuration validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::model::{Environment, WorkspaceConfig};

static WS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][-_.a-zA-Z0-9]{1,98}[a-zA-Z0-9]$")
        .expect("constant regex pattern is valid")
});

static SERVER_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{1,5}(/tcp|/udp)?$").expect("constant regex pattern is valid")
});

const MEMORY_LIMIT_ATTRIBUTE: &str = "memoryLimitBytes";

/// Checks a workspace configuration before it is stored or started.
pub trait WorkspaceValidator: Send + Sync {
    /// Fail with `Validation` describing the first problem found.
    fn validate_config(&self, config: &WorkspaceConfig) -> Result<()>;
}

/// Validator enforcing naming, environment and command rules.
#[derive(Debug, Clone)]
pub struct DefaultWorkspaceValidator {
    supported_recipe_types: Vec<String>,
}

impl DefaultWorkspaceValidator {
    /// Create a validator accepting the given recipe types.
    pub fn new(supported_recipe_types: Vec<String>) -> Self {
        Self {
            supported_recipe_types,
        }
    }

    fn validate_environment(&self, env_name: &str, env: &Environment) -> Result<()> {
        check(
            !env_name.trim().is_empty(),
            "Environment name should be neither null nor empty",
        )?;

        let recipe = &env.recipe;
        check(
            !recipe.recipe_type.trim().is_empty(),
            format!("Type of environment '{}' recipe is required", env_name),
        )?;
        check(
            self.supported_recipe_types.contains(&recipe.recipe_type),
            format!(
                "Type '{}' of environment '{}' is not supported. Supported types: {}",
                recipe.recipe_type,
                env_name,
                self.supported_recipe_types.join(", ")
            ),
        )?;
        check(
            recipe.content.as_deref().is_some_and(|c| !c.is_empty())
                || recipe.location.as_deref().is_some_and(|l| !l.is_empty()),
            format!(
                "Recipe of environment '{}' must contain location or content",
                env_name
            ),
        )?;

        for (machine_name, machine) in &env.machines {
            check(
                !machine_name.trim().is_empty(),
                format!(
                    "Environment '{}' contains machine with null or empty name",
                    env_name
                ),
            )?;

            if let Some(limit) = machine.attributes.get(MEMORY_LIMIT_ATTRIBUTE) {
                check(
                    limit.parse::<u64>().is_ok_and(|v| v > 0),
                    format!(
                        "Value '{}' of attribute '{}' in machine '{}' is illegal",
                        limit, MEMORY_LIMIT_ATTRIBUTE, machine_name
                    ),
                )?;
            }

            for (server_ref, server) in &machine.servers {
                check(
                    SERVER_PORT.is_match(&server.port),
                    format!(
                        "Machine '{}' in environment '{}' contains server conf '{}' with invalid port '{}'",
                        machine_name, env_name, server_ref, server.port
                    ),
                )?;
            }
        }
        Ok(())
    }
}

impl WorkspaceValidator for DefaultWorkspaceValidator {
    fn validate_config(&self, config: &WorkspaceConfig) -> Result<()> {
        check(!config.name.is_empty(), "Workspace name required")?;
        check(
            WS_NAME.is_match(&config.name),
            format!(
                "Incorrect workspace name, it must be between 3 and 100 characters and may contain \
                 digits, latin letters, underscores, dots, dashes and must start and end only with \
                 digits, latin letters or underscores: '{}'",
                config.name
            ),
        )?;

        check(
            !config.default_env.trim().is_empty(),
            "Workspace default environment name required",
        )?;
        check(
            config.environments.contains_key(&config.default_env),
            format!(
                "Workspace default environment configuration required: '{}'",
                config.default_env
            ),
        )?;

        for (env_name, env) in &config.environments {
            self.validate_environment(env_name, env)?;
        }

        for command in &config.commands {
            check(
                !command.name.trim().is_empty(),
                format!(
                    "Workspace '{}' contains command with null or empty name",
                    config.name
                ),
            )?;
            check(
                !command.command_line.trim().is_empty(),
                format!(
                    "Command line required for command '{}' in workspace '{}'",
                    command.name, config.name
                ),
            )?;
            check(
                !command.command_type.trim().is_empty(),
                format!(
                    "Type required for command '{}' in workspace '{}'",
                    command.name, config.name
                ),
            )?;
        }
        Ok(())
    }
}

fn check(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Validation(message.into()))
    }
}
