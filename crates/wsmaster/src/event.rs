// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle events.
//!
//! One [`WorkspaceStatusEvent`] is published per status transition. Delivery
//! is fire-and-forget: publishing never blocks and never fails the caller.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::WorkspaceStatus;

/// Kind of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Start accepted.
    Starting,
    /// Runtime is up.
    Running,
    /// Stop accepted.
    Stopping,
    /// Runtime is gone.
    Stopped,
    /// Start or stop failed.
    Error,
}

/// A workspace status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceStatusEvent {
    /// Workspace ID
    pub workspace_id: String,
    /// Status after the transition
    pub status: WorkspaceStatus,
    /// Status before the transition
    pub prev_status: WorkspaceStatus,
    /// Transition kind
    pub event_type: EventType,
    /// Failure message for `Error` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkspaceStatusEvent {
    /// A successful transition from `prev_status` to `status`.
    pub fn transition(
        workspace_id: impl Into<String>,
        prev_status: WorkspaceStatus,
        status: WorkspaceStatus,
    ) -> Self {
        let event_type = match status {
            WorkspaceStatus::Starting => EventType::Starting,
            WorkspaceStatus::Running => EventType::Running,
            WorkspaceStatus::Stopping => EventType::Stopping,
            WorkspaceStatus::Stopped => EventType::Stopped,
        };
        Self {
            workspace_id: workspace_id.into(),
            status,
            prev_status,
            event_type,
            error: None,
        }
    }

    /// A failed start or stop. The workspace ends up STOPPED.
    pub fn error(
        workspace_id: impl Into<String>,
        prev_status: WorkspaceStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            status: WorkspaceStatus::Stopped,
            prev_status,
            event_type: EventType::Error,
            error: Some(error.into()),
        }
    }
}

/// Events published by wsmaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    /// Status transition.
    Status(WorkspaceStatusEvent),
    /// A workspace was persisted.
    Created {
        /// Workspace ID
        workspace_id: String,
        /// Namespace the workspace lives in
        namespace: String,
        /// Workspace name
        name: String,
    },
}

impl WorkspaceEvent {
    /// Workspace the event is about.
    pub fn workspace_id(&self) -> &str {
        match self {
            WorkspaceEvent::Status(e) => &e.workspace_id,
            WorkspaceEvent::Created { workspace_id, .. } => workspace_id,
        }
    }
}

/// Publish/subscribe bus for lifecycle events.
pub trait EventService: Send + Sync {
    /// Publish an event. Never blocks.
    fn publish(&self, event: WorkspaceEvent);
}

/// Event service backed by a tokio broadcast channel.
///
/// Subscribers that fall behind by more than the channel capacity lose the
/// oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventService {
    sender: broadcast::Sender<WorkspaceEvent>,
}

impl BroadcastEventService {
    /// Create a new event service with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }
}

impl EventService for BroadcastEventService {
    fn publish(&self, event: WorkspaceEvent) {
        trace!(workspace_id = %event.workspace_id(), ?event, "Publishing event");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
