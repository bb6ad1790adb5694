// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable write-through for the engine's in-memory records.

use async_trait::async_trait;

use drover_server_db::{DbError, TaskRepository, TaskRow};

use crate::types::{TaskSnapshot, TaskStatus};

/// The engine persists through this capability. Write failures never block
/// state transitions; they are logged and the in-memory copy stays
/// authoritative.
#[async_trait]
pub trait TaskStore: Send + Sync {
	async fn persist(&self, snapshot: &TaskSnapshot) -> Result<(), DbError>;

	/// Tasks left in `pending` by a previous process, for optional
	/// re-enqueue at startup.
	async fn pending_tasks(&self) -> Result<Vec<TaskSnapshot>, DbError>;

	/// Fail tasks left in `running` by a previous process. Returns the
	/// number marked.
	async fn fail_stuck_running(&self, marker: &str) -> Result<u64, DbError>;
}

fn snapshot_to_row(snapshot: &TaskSnapshot) -> TaskRow {
	TaskRow {
		id: snapshot.id.clone(),
		task_type: snapshot.task_type.clone(),
		params: snapshot.params.clone(),
		caller_id: snapshot.caller_id.clone(),
		callback_url: snapshot.callback_url.clone(),
		response_channel: snapshot.response_channel.clone(),
		response_thread: snapshot.response_thread.clone(),
		project_id: snapshot.project_id.clone(),
		session_key: snapshot.session_key.clone(),
		ttl_ms: snapshot.ttl_ms,
		status: snapshot.status.as_str().to_string(),
		result: snapshot.result.clone(),
		error: snapshot.error.clone(),
		created_at: snapshot.created_at,
		started_at: snapshot.started_at,
		completed_at: snapshot.completed_at,
	}
}

fn row_to_snapshot(row: TaskRow) -> Result<TaskSnapshot, DbError> {
	let status: TaskStatus = row.status.parse().map_err(DbError::Internal)?;
	Ok(TaskSnapshot {
		id: row.id,
		task_type: row.task_type,
		params: row.params,
		caller_id: row.caller_id,
		callback_url: row.callback_url,
		response_channel: row.response_channel,
		response_thread: row.response_thread,
		project_id: row.project_id,
		session_key: row.session_key,
		ttl_ms: row.ttl_ms,
		status,
		result: row.result,
		error: row.error,
		created_at: row.created_at,
		started_at: row.started_at,
		completed_at: row.completed_at,
	})
}

#[async_trait]
impl TaskStore for TaskRepository {
	async fn persist(&self, snapshot: &TaskSnapshot) -> Result<(), DbError> {
		self.upsert_task(&snapshot_to_row(snapshot)).await
	}

	async fn pending_tasks(&self) -> Result<Vec<TaskSnapshot>, DbError> {
		self.tasks_in_status(TaskStatus::Pending.as_str())
			.await?
			.into_iter()
			.map(row_to_snapshot)
			.collect()
	}

	async fn fail_stuck_running(&self, marker: &str) -> Result<u64, DbError> {
		TaskRepository::fail_stuck_running(self, marker).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use drover_server_db::testing::create_test_pool;

	fn snapshot(id: &str, status: TaskStatus) -> TaskSnapshot {
		TaskSnapshot {
			id: id.to_string(),
			task_type: "noop".to_string(),
			params: serde_json::json!({}),
			caller_id: None,
			callback_url: None,
			response_channel: None,
			response_thread: None,
			project_id: None,
			session_key: None,
			ttl_ms: None,
			status,
			result: None,
			error: None,
			created_at: Utc::now(),
			started_at: None,
			completed_at: None,
		}
	}

	#[tokio::test]
	async fn test_persist_and_recover_pending() {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool);

		TaskStore::persist(&repo, &snapshot("t1", TaskStatus::Pending))
			.await
			.unwrap();
		TaskStore::persist(&repo, &snapshot("t2", TaskStatus::Running))
			.await
			.unwrap();

		let pending = repo.pending_tasks().await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].id, "t1");
		assert_eq!(pending[0].status, TaskStatus::Pending);

		let marked = TaskStore::fail_stuck_running(&repo, "stuck_on_startup")
			.await
			.unwrap();
		assert_eq!(marked, 1);
	}
}
