// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Registry executor: task type → handler.
//!
//! Deployment builds register the real integration handlers (forge, issue
//! tracker, cluster); the built-ins here cover the task types the server
//! itself can satisfy.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use drover_server_chat::Responder;
use drover_server_engine::{ExecutionContext, ExecutorError, TaskExecutor};

#[async_trait]
pub trait TaskHandler: Send + Sync {
	async fn handle(
		&self,
		ctx: ExecutionContext,
		params: &serde_json::Value,
	) -> Result<serde_json::Value, ExecutorError>;
}

#[derive(Default)]
pub struct RegistryExecutor {
	handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl RegistryExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, task_type: &str, handler: Arc<dyn TaskHandler>) {
		self.handlers.insert(task_type.to_string(), handler);
	}

	pub fn registered_types(&self) -> Vec<String> {
		self.handlers.keys().cloned().collect()
	}
}

#[async_trait]
impl TaskExecutor for RegistryExecutor {
	async fn execute(
		&self,
		ctx: ExecutionContext,
		task_type: &str,
		params: &serde_json::Value,
	) -> Result<serde_json::Value, ExecutorError> {
		let handler = self
			.handlers
			.get(task_type)
			.ok_or_else(|| ExecutorError::new(format!("no handler registered for {task_type}")))?;
		debug!(task_id = %ctx.task_id, task_type, "dispatching to handler");
		handler.handle(ctx, params).await
	}
}

/// Echo handler for the `noop` type.
pub struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
	async fn handle(
		&self,
		_ctx: ExecutionContext,
		_params: &serde_json::Value,
	) -> Result<serde_json::Value, ExecutorError> {
		Ok(serde_json::json!({
			"status": "completed",
			"message": "Task type noop executed (no-op)",
		}))
	}
}

/// `slack.send-message`: post through the injected responder.
pub struct SendMessageHandler {
	responder: Arc<dyn Responder>,
}

impl SendMessageHandler {
	pub fn new(responder: Arc<dyn Responder>) -> Self {
		Self { responder }
	}
}

#[async_trait]
impl TaskHandler for SendMessageHandler {
	async fn handle(
		&self,
		_ctx: ExecutionContext,
		params: &serde_json::Value,
	) -> Result<serde_json::Value, ExecutorError> {
		let channel = params
			.get("channel")
			.and_then(|v| v.as_str())
			.ok_or_else(|| ExecutorError::new("missing 'channel' parameter"))?;
		let text = params
			.get("text")
			.and_then(|v| v.as_str())
			.ok_or_else(|| ExecutorError::new("missing 'text' parameter"))?;
		let thread_ts = params.get("thread_ts").and_then(|v| v.as_str());

		self.responder
			.post_message(channel, thread_ts, text)
			.await
			.map_err(|e| ExecutorError::new(e.to_string()))?;

		Ok(serde_json::json!({
			"status": "sent",
			"channel": channel,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn ctx() -> ExecutionContext {
		ExecutionContext {
			task_id: "t1".to_string(),
			session_key: None,
			project_id: None,
			deadline: Duration::from_secs(5),
		}
	}

	#[tokio::test]
	async fn test_registry_dispatch_and_unknown() {
		let mut registry = RegistryExecutor::new();
		registry.register("noop", Arc::new(NoopHandler));

		let out = registry
			.execute(ctx(), "noop", &serde_json::json!({}))
			.await
			.unwrap();
		assert_eq!(out["message"], "Task type noop executed (no-op)");

		let err = registry
			.execute(ctx(), "deploy.service", &serde_json::json!({}))
			.await
			.unwrap_err();
		assert!(err.message.contains("no handler registered"));
	}
}
