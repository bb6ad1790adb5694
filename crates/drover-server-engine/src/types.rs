// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Pending,
	Running,
	AwaitingApproval,
	Completed,
	Failed,
	Cancelled,
}

impl TaskStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			TaskStatus::Pending => "pending",
			TaskStatus::Running => "running",
			TaskStatus::AwaitingApproval => "awaiting_approval",
			TaskStatus::Completed => "completed",
			TaskStatus::Failed => "failed",
			TaskStatus::Cancelled => "cancelled",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
		)
	}
}

impl std::str::FromStr for TaskStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"pending" => Ok(TaskStatus::Pending),
			"running" => Ok(TaskStatus::Running),
			"awaiting_approval" => Ok(TaskStatus::AwaitingApproval),
			"completed" => Ok(TaskStatus::Completed),
			"failed" => Ok(TaskStatus::Failed),
			"cancelled" => Ok(TaskStatus::Cancelled),
			_ => Err(format!("unknown task status: {s}")),
		}
	}
}

impl std::fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A submission accepted over the management API.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
	pub task_type: String,
	pub params: serde_json::Value,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
	pub ttl: Option<Duration>,
}

/// A deep-copied, lock-free view of a task, safe to expose from read APIs
/// and to embed in callback payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
	pub id: String,
	#[serde(rename = "type")]
	pub task_type: String,
	pub params: serde_json::Value,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
	pub ttl_ms: Option<i64>,
	pub status: TaskStatus,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

/// Filter and pagination for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
	pub status: Option<TaskStatus>,
	pub task_type: Option<String>,
	pub caller_id: Option<String>,
	pub offset: usize,
	pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
	pub total: usize,
	pub by_status: HashMap<String, usize>,
	pub by_type: HashMap<String, usize>,
	pub avg_duration_ms: f64,
}

pub(crate) struct TaskState {
	pub status: TaskStatus,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

/// The engine-owned task record. Immutable identity fields sit beside a
/// reader-writer lock guarding the mutable state-machine fields.
pub(crate) struct TaskRecord {
	pub id: String,
	pub task_type: String,
	pub params: serde_json::Value,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
	pub ttl: Option<Duration>,
	pub created_at: DateTime<Utc>,
	pub state: RwLock<TaskState>,
}

impl TaskRecord {
	pub fn new(id: String, request: SubmitRequest) -> Self {
		Self {
			id,
			task_type: request.task_type,
			params: request.params,
			caller_id: request.caller_id,
			callback_url: request.callback_url,
			response_channel: request.response_channel,
			response_thread: request.response_thread,
			project_id: request.project_id,
			session_key: request.session_key,
			ttl: request.ttl,
			created_at: Utc::now(),
			state: RwLock::new(TaskState {
				status: TaskStatus::Pending,
				result: None,
				error: None,
				started_at: None,
				completed_at: None,
			}),
		}
	}

	pub async fn snapshot(&self) -> TaskSnapshot {
		let state = self.state.read().await;
		TaskSnapshot {
			id: self.id.clone(),
			task_type: self.task_type.clone(),
			params: self.params.clone(),
			caller_id: self.caller_id.clone(),
			callback_url: self.callback_url.clone(),
			response_channel: self.response_channel.clone(),
			response_thread: self.response_thread.clone(),
			project_id: self.project_id.clone(),
			session_key: self.session_key.clone(),
			ttl_ms: self.ttl.map(|d| d.as_millis() as i64),
			status: state.status,
			result: state.result.clone(),
			error: state.error.clone(),
			created_at: self.created_at,
			started_at: state.started_at,
			completed_at: state.completed_at,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_round_trip() {
		for status in [
			TaskStatus::Pending,
			TaskStatus::Running,
			TaskStatus::AwaitingApproval,
			TaskStatus::Completed,
			TaskStatus::Failed,
			TaskStatus::Cancelled,
		] {
			assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
		}
		assert!("bogus".parse::<TaskStatus>().is_err());
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(TaskStatus::Completed.is_terminal());
		assert!(TaskStatus::Failed.is_terminal());
		assert!(TaskStatus::Cancelled.is_terminal());
		assert!(!TaskStatus::Pending.is_terminal());
		assert!(!TaskStatus::Running.is_terminal());
		assert!(!TaskStatus::AwaitingApproval.is_terminal());
	}
}
