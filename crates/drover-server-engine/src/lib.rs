// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded-queue multi-worker task engine.
//!
//! Tasks move through a durable state machine
//! (pending → running → awaiting_approval/completed/failed/cancelled) under
//! a per-task lock; snapshots are deep copies safe to expose without
//! holding any lock. The engine is polymorphic over its collaborators:
//! executor, completion notifier, approval sink, and store.

pub mod engine;
pub mod error;
pub mod executor;
pub mod store;
pub mod types;

pub use engine::{EngineConfig, TaskEngine, STUCK_ON_STARTUP};
pub use error::{EngineError, Result};
pub use executor::{
	ApprovalSink, CompletionNotifier, ExecutionContext, ExecutorError, TaskExecutor,
	AWAITING_APPROVAL_PREFIX,
};
pub use store::TaskStore;
pub use types::{EngineStats, SubmitRequest, TaskFilter, TaskSnapshot, TaskStatus};
