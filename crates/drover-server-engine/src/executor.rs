// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capabilities the engine is polymorphic over.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::TaskStatus;

/// Error-message prefix an executor uses to park a task for a human
/// decision instead of failing it.
pub const AWAITING_APPROVAL_PREFIX: &str = "awaiting_approval:";

/// Ambient values the engine attaches to an execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
	pub task_id: String,
	pub session_key: Option<String>,
	pub project_id: Option<String>,
	/// The effective deadline for this execution; the engine aborts the
	/// executor once it elapses.
	pub deadline: Duration,
}

/// An executor-returned failure. The message is surfaced verbatim in the
/// task's error field; the awaiting-approval sentinel is intercepted before
/// classification.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorError {
	pub message: String,
}

impl ExecutorError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}

	/// Construct the sentinel that parks the task in awaiting_approval.
	pub fn awaiting_approval(reason: impl AsRef<str>) -> Self {
		Self {
			message: format!("{AWAITING_APPROVAL_PREFIX}{}", reason.as_ref()),
		}
	}

	pub fn is_awaiting_approval(&self) -> bool {
		self.message.starts_with(AWAITING_APPROVAL_PREFIX)
	}

	pub fn approval_reason(&self) -> Option<&str> {
		self.message.strip_prefix(AWAITING_APPROVAL_PREFIX)
	}
}

/// Executes a task of a given type. Implementations typically hold a
/// registry of per-type handlers and reject unknown types at execute time;
/// the engine already validates against its closed set at submit time.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
	async fn execute(
		&self,
		ctx: ExecutionContext,
		task_type: &str,
		params: &serde_json::Value,
	) -> std::result::Result<serde_json::Value, ExecutorError>;
}

/// Posts a human-readable completion notice into chat. Invoked once per
/// task entering completed/failed iff the task declared a response channel.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
	#[allow(clippy::too_many_arguments)]
	async fn notify_task_completion(
		&self,
		channel: &str,
		thread: Option<&str>,
		task_id: &str,
		task_type: &str,
		status: TaskStatus,
		result: Option<&serde_json::Value>,
		error: Option<&str>,
	);
}

/// Observes a task parking in awaiting_approval. The implementation records
/// a pending approval and prompts the approvers in chat.
#[async_trait]
pub trait ApprovalSink: Send + Sync {
	async fn record_awaiting_approval(&self, task: &crate::types::TaskSnapshot, reason: &str);
}
