// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable task rows.
//!
//! The engine owns the in-memory task records; this repository holds the
//! durable copies written through on every state transition.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{DbError, Result};

/// A task as persisted. Status is kept as its wire string; the engine owns
/// the typed state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
	pub id: String,
	pub task_type: String,
	pub params: serde_json::Value,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
	pub ttl_ms: Option<i64>,
	pub status: String,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TaskRepository {
	pool: SqlitePool,
}

impl TaskRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Write through a task's full current state.
	#[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
	pub async fn upsert_task(&self, task: &TaskRow) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO tasks (
				id, task_type, params, caller_id, callback_url, response_channel,
				response_thread, project_id, session_key, ttl_ms, status, result,
				error, created_at, started_at, completed_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				status = excluded.status,
				result = excluded.result,
				error = excluded.error,
				project_id = excluded.project_id,
				session_key = excluded.session_key,
				started_at = excluded.started_at,
				completed_at = excluded.completed_at
			"#,
		)
		.bind(&task.id)
		.bind(&task.task_type)
		.bind(serde_json::to_string(&task.params)?)
		.bind(&task.caller_id)
		.bind(&task.callback_url)
		.bind(&task.response_channel)
		.bind(&task.response_thread)
		.bind(&task.project_id)
		.bind(&task.session_key)
		.bind(task.ttl_ms)
		.bind(&task.status)
		.bind(
			task.result
				.as_ref()
				.map(serde_json::to_string)
				.transpose()?,
		)
		.bind(&task.error)
		.bind(fmt_ts(task.created_at))
		.bind(task.started_at.map(fmt_ts))
		.bind(task.completed_at.map(fmt_ts))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>> {
		let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row.map(|r| task_from_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn tasks_in_status(&self, status: &str) -> Result<Vec<TaskRow>> {
		let rows = sqlx::query("SELECT * FROM tasks WHERE status = ? ORDER BY created_at ASC")
			.bind(status)
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(task_from_row).collect()
	}

	/// Fail every task left in `running` by a previous process.
	///
	/// Returns the number of tasks marked. Called once at engine start as
	/// the crash-recovery step.
	#[tracing::instrument(skip(self))]
	pub async fn fail_stuck_running(&self, marker: &str) -> Result<u64> {
		let now = fmt_ts(Utc::now());
		let result = sqlx::query(
			"UPDATE tasks SET status = 'failed', error = ?, completed_at = ? WHERE status = 'running'",
		)
		.bind(marker)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	/// Detach all tasks from a deleted project.
	#[tracing::instrument(skip(self))]
	pub async fn unlink_project(&self, project_id: &str) -> Result<u64> {
		let result = sqlx::query("UPDATE tasks SET project_id = NULL WHERE project_id = ?")
			.bind(project_id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_for_project(&self, project_id: &str) -> Result<i64> {
		let (count,): (i64,) =
			sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE project_id = ?")
				.bind(project_id)
				.fetch_one(&self.pool)
				.await?;
		Ok(count)
	}

	/// Delete terminal tasks whose completion predates the cutoff.
	#[tracing::instrument(skip(self))]
	pub async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query(
			r#"
			DELETE FROM tasks
			WHERE status IN ('completed', 'failed', 'cancelled')
			  AND completed_at IS NOT NULL
			  AND completed_at < ?
			"#,
		)
		.bind(fmt_ts(cutoff))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.as_deref().map(parse_ts).transpose()
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRow> {
	let params: String = row.try_get("params")?;
	let result: Option<String> = row.try_get("result")?;
	let created_at: String = row.try_get("created_at")?;
	let started_at: Option<String> = row.try_get("started_at")?;
	let completed_at: Option<String> = row.try_get("completed_at")?;

	Ok(TaskRow {
		id: row.try_get("id")?,
		task_type: row.try_get("task_type")?,
		params: serde_json::from_str(&params)?,
		caller_id: row.try_get("caller_id")?,
		callback_url: row.try_get("callback_url")?,
		response_channel: row.try_get("response_channel")?,
		response_thread: row.try_get("response_thread")?,
		project_id: row.try_get("project_id")?,
		session_key: row.try_get("session_key")?,
		ttl_ms: row.try_get("ttl_ms")?,
		status: row.try_get("status")?,
		result: result.as_deref().map(serde_json::from_str).transpose()?,
		error: row.try_get("error")?,
		created_at: parse_ts(&created_at)?,
		started_at: parse_opt_ts(started_at)?,
		completed_at: parse_opt_ts(completed_at)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn sample_task(id: &str, status: &str) -> TaskRow {
		TaskRow {
			id: id.to_string(),
			task_type: "noop".to_string(),
			params: serde_json::json!({"x": 1}),
			caller_id: Some("caller-1".to_string()),
			callback_url: None,
			response_channel: None,
			response_thread: None,
			project_id: None,
			session_key: None,
			ttl_ms: None,
			status: status.to_string(),
			result: None,
			error: None,
			created_at: Utc::now(),
			started_at: None,
			completed_at: None,
		}
	}

	#[tokio::test]
	async fn test_upsert_and_get_round_trip() {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool);

		let task = sample_task("t1", "pending");
		repo.upsert_task(&task).await.unwrap();

		let loaded = repo.get_task("t1").await.unwrap().unwrap();
		assert_eq!(loaded.task_type, "noop");
		assert_eq!(loaded.params, serde_json::json!({"x": 1}));
		assert_eq!(loaded.status, "pending");
		assert!(loaded.completed_at.is_none());
	}

	#[tokio::test]
	async fn test_upsert_updates_mutable_fields() {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool);

		let mut task = sample_task("t1", "pending");
		repo.upsert_task(&task).await.unwrap();

		task.status = "completed".to_string();
		task.result = Some(serde_json::json!({"ok": true}));
		task.completed_at = Some(Utc::now());
		repo.upsert_task(&task).await.unwrap();

		let loaded = repo.get_task("t1").await.unwrap().unwrap();
		assert_eq!(loaded.status, "completed");
		assert_eq!(loaded.result, Some(serde_json::json!({"ok": true})));
		assert!(loaded.completed_at.is_some());
	}

	#[tokio::test]
	async fn test_fail_stuck_running() {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool);

		repo.upsert_task(&sample_task("t1", "running")).await.unwrap();
		repo.upsert_task(&sample_task("t2", "pending")).await.unwrap();

		let marked = repo.fail_stuck_running("stuck_on_startup").await.unwrap();
		assert_eq!(marked, 1);

		let t1 = repo.get_task("t1").await.unwrap().unwrap();
		assert_eq!(t1.status, "failed");
		assert_eq!(t1.error.as_deref(), Some("stuck_on_startup"));
		assert!(t1.completed_at.is_some());

		let t2 = repo.get_task("t2").await.unwrap().unwrap();
		assert_eq!(t2.status, "pending");
	}

	#[tokio::test]
	async fn test_delete_completed_before_spares_recent_and_open() {
		let pool = create_test_pool().await;
		let repo = TaskRepository::new(pool);

		let mut old = sample_task("old", "completed");
		old.completed_at = Some(Utc::now() - chrono::Duration::days(8));
		repo.upsert_task(&old).await.unwrap();

		let mut recent = sample_task("recent", "completed");
		recent.completed_at = Some(Utc::now());
		repo.upsert_task(&recent).await.unwrap();

		repo.upsert_task(&sample_task("open", "pending")).await.unwrap();

		let cutoff = Utc::now() - chrono::Duration::days(7);
		let deleted = repo.delete_completed_before(cutoff).await.unwrap();
		assert_eq!(deleted, 1);

		assert!(repo.get_task("old").await.unwrap().is_none());
		assert!(repo.get_task("recent").await.unwrap().is_some());
		assert!(repo.get_task("open").await.unwrap().is_some());
	}
}
