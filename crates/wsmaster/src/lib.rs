// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wsmaster - Workspace Runtime Lifecycle Management
//!
//! This crate tracks the status of each workspace, coordinates asynchronous
//! start and stop against pluggable infrastructures, serializes transitions
//! per workspace and publishes lifecycle events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Callers                                    │
//! │                    (REST layer, IDE clients, CLI)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       WorkspaceManager (facade)                         │
//! │        CRUD + start/stop, status cache overlaid on every read           │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                        │                          │
//!           │ persist                │ start_async/stop_async   │ Created
//!           ▼                        ▼                          ▼
//! ┌───────────────────┐   ┌───────────────────────┐   ┌─────────────────────┐
//! │   WorkspaceDao    │   │   WorkspaceRuntimes   │──►│    EventService     │
//! │  AccountManager   │   │  (live map, one entry │   │ (status transitions)│
//! └───────────────────┘   │    per workspace)     │   └─────────────────────┘
//!                         └───────────┬───────────┘
//!                                     │ SharedPool tasks
//!                                     ▼
//!                         ┌───────────────────────┐
//!                         │ RuntimeInfrastructure │
//!                         │ prepare → Context     │
//!                         │ Context.start/stop    │
//!                         └───────────────────────┘
//! ```
//!
//! # Workspace Status State Machine
//!
//! ```text
//!      ┌─────────┐  start   ┌──────────┐   ok    ┌─────────┐
//!      │ STOPPED │─────────►│ STARTING │────────►│ RUNNING │
//!      └─────────┘          └──────────┘         └────┬────┘
//!        ▲    ▲                  │                    │ stop
//!        │    │   failure/timeout│                    ▼
//!        │    └──────────────────┘              ┌──────────┐
//!        │              (ERROR event)           │ STOPPING │
//!        │                                      └────┬─────┘
//!        └───────────────────────────────────────────┘
//!                   done (STOPPED or ERROR event)
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `WSMASTER_POOL_SIZE` | No | `10` | Concurrent start/stop tasks |
//! | `WSMASTER_START_TIMEOUT_SECS` | No | `300` | Bound on infrastructure start |
//! | `WSMASTER_STOP_TIMEOUT_SECS` | No | `60` | Bound on infrastructure stop |
//! | `WSMASTER_EVENT_CAPACITY` | No | `1024` | Event channel capacity |
//! | `WSMASTER_RECOVER_RUNTIMES` | No | `true` | Adopt live runtimes at startup |
//! | `WSMASTER_SHUTDOWN_GRACE_SECS` | No | `30` | Pool drain period on shutdown |
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`dao`]: Workspace and account persistence traits
//! - [`error`]: Error types
//! - [`event`]: Lifecycle events and the event service
//! - [`infrastructure`]: Infrastructure plugins and the runtime context
//! - [`manager`]: Workspace manager facade
//! - [`model`]: Workspace data model
//! - [`pool`]: Bounded pool for lifecycle tasks
//! - [`runtimes`]: Registry of live runtimes
//! - [`service`]: Embeddable master wiring everything together
//! - [`subject`]: Current user of a request
//! - [`validator`]: Workspace configuration validation

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Workspace and account persistence.
pub mod dao;

/// Error types for wsmaster operations.
pub mod error;

/// Lifecycle events.
pub mod event;

/// Runtime infrastructures (plugins), runtime context and internal runtime.
pub mod infrastructure;

/// Workspace manager facade.
pub mod manager;

/// Workspace data model.
pub mod model;

/// Bounded pool for slow lifecycle work.
pub mod pool;

/// Registry of live workspace runtimes.
pub mod runtimes;

/// Embeddable workspace master.
pub mod service;

/// Current user of a request.
pub mod subject;

/// Workspace configuration validation.
pub mod validator;

pub use config::Config;
pub use error::Error;
