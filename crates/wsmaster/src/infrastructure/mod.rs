// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure module - pluggable runtime backends.
//!
//! An infrastructure turns an environment into a [`RuntimeContext`], whose
//! state machine wraps the backend-specific start and stop.

mod context;
pub mod mock;
mod traits;

pub use context::{InternalRuntime, RuntimeContext};
pub use mock::MockInfrastructure;
pub use traits::*;
