// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Current user of a request.
//!
//! The subject travels with the calling task. Tasks spawned from it do not
//! inherit it, so anything needed later must be read before spawning.

use std::future::Future;

tokio::task_local! {
    static CURRENT: Subject;
}

/// The user a request is performed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// User ID
    pub user_id: String,
    /// User name, also the name of the user's personal namespace
    pub user_name: String,
}

impl Subject {
    /// Create a new subject.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// Run `future` with `subject` as the current subject.
    pub async fn scope<F>(subject: Subject, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(subject, future).await
    }

    /// The current subject, if any.
    pub fn current() -> Option<Subject> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// User name of the current subject, or `"undefined"` for log lines.
    pub fn current_user_name() -> String {
        Self::current()
            .map(|s| s.user_name)
            .unwrap_or_else(|| "undefined".to_string())
    }
}
