// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job bookkeeping: registered definitions and run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::task::{fmt_ts, parse_opt_ts, parse_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Running,
	Succeeded,
	Failed,
	Cancelled,
}

impl JobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobStatus::Running => "running",
			JobStatus::Succeeded => "succeeded",
			JobStatus::Failed => "failed",
			JobStatus::Cancelled => "cancelled",
		}
	}
}

impl std::str::FromStr for JobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"running" => Ok(JobStatus::Running),
			"succeeded" => Ok(JobStatus::Succeeded),
			"failed" => Ok(JobStatus::Failed),
			"cancelled" => Ok(JobStatus::Cancelled),
			_ => Err(format!("unknown job status: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
	pub id: String,
	pub name: String,
	pub description: String,
	pub interval_secs: Option<i64>,
	pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
	pub id: String,
	pub job_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
	pub retry_count: u32,
	pub triggered_by: String,
	pub detail: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, def), fields(job_id = %def.id))]
	pub async fn upsert_definition(&self, def: &JobDefinition) -> Result<()> {
		let now = fmt_ts(Utc::now());
		sqlx::query(
			r#"
			INSERT INTO job_definitions (id, name, description, interval_secs, enabled, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(id) DO UPDATE SET
				name = excluded.name,
				description = excluded.description,
				interval_secs = excluded.interval_secs,
				enabled = excluded.enabled,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&def.id)
		.bind(&def.name)
		.bind(&def.description)
		.bind(def.interval_secs)
		.bind(def.enabled)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, run), fields(job_id = %run.job_id, run_id = %run.id))]
	pub async fn insert_run(&self, run: &JobRun) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_runs (id, job_id, status, started_at, completed_at, duration_ms, error, retry_count, triggered_by, detail)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(run.status.as_str())
		.bind(fmt_ts(run.started_at))
		.bind(run.completed_at.map(fmt_ts))
		.bind(run.duration_ms)
		.bind(&run.error)
		.bind(run.retry_count as i64)
		.bind(&run.triggered_by)
		.bind(run.detail.as_ref().map(|d| d.to_string()))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, detail))]
	pub async fn finish_run(
		&self,
		run_id: &str,
		status: JobStatus,
		error: Option<String>,
		detail: Option<serde_json::Value>,
	) -> Result<()> {
		let now = Utc::now();
		sqlx::query(
			r#"
			UPDATE job_runs
			SET status = ?,
			    completed_at = ?,
			    duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000 AS INTEGER),
			    error = ?,
			    detail = ?
			WHERE id = ?
			"#,
		)
		.bind(status.as_str())
		.bind(fmt_ts(now))
		.bind(fmt_ts(now))
		.bind(error)
		.bind(detail.map(|d| d.to_string()))
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		let row = sqlx::query_as::<
			_,
			(
				String,
				String,
				String,
				String,
				Option<String>,
				Option<i64>,
				Option<String>,
				i64,
				String,
				Option<String>,
			),
		>(
			"SELECT id, job_id, status, started_at, completed_at, duration_ms, error, retry_count, triggered_by, detail FROM job_runs WHERE job_id = ? ORDER BY started_at DESC LIMIT 1",
		)
		.bind(job_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(
			|(id, job_id, status, started_at, completed_at, duration_ms, error, retry_count, triggered_by, detail)| {
				Ok(JobRun {
					id,
					job_id,
					status: status.parse().map_err(crate::error::DbError::Internal)?,
					started_at: parse_ts(&started_at)?,
					completed_at: parse_opt_ts(completed_at)?,
					duration_ms,
					error,
					retry_count: retry_count as u32,
					triggered_by,
					detail: detail.as_deref().map(serde_json::from_str).transpose()?,
				})
			},
		)
		.transpose()
	}

	/// Failures since the last success, newest first.
	#[tracing::instrument(skip(self))]
	pub async fn consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let rows = sqlx::query_as::<_, (String,)>(
			"SELECT status FROM job_runs WHERE job_id = ? AND status != 'running' ORDER BY started_at DESC LIMIT 20",
		)
		.bind(job_id)
		.fetch_all(&self.pool)
		.await?;

		let mut count = 0;
		for (status,) in rows {
			if status == "failed" {
				count += 1;
			} else {
				break;
			}
		}
		Ok(count)
	}

	#[tracing::instrument(skip(self))]
	pub async fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM job_runs WHERE started_at < ? AND status != 'running'")
			.bind(fmt_ts(cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use uuid::Uuid;

	fn run(job_id: &str, status: JobStatus) -> JobRun {
		JobRun {
			id: Uuid::new_v4().to_string(),
			job_id: job_id.to_string(),
			status,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error: None,
			retry_count: 0,
			triggered_by: "schedule".to_string(),
			detail: None,
		}
	}

	#[tokio::test]
	async fn test_run_lifecycle() {
		let pool = create_test_pool().await;
		let repo = JobRepository::new(pool);

		let r = run("retention", JobStatus::Running);
		repo.insert_run(&r).await.unwrap();
		repo.finish_run(&r.id, JobStatus::Succeeded, None, Some(serde_json::json!({"deleted": 3})))
			.await
			.unwrap();

		let last = repo.last_run("retention").await.unwrap().unwrap();
		assert_eq!(last.status, JobStatus::Succeeded);
		assert!(last.completed_at.is_some());
		assert_eq!(last.detail, Some(serde_json::json!({"deleted": 3})));
	}

	#[tokio::test]
	async fn test_consecutive_failures_counts_until_success() {
		let pool = create_test_pool().await;
		let repo = JobRepository::new(pool);

		for status in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Failed] {
			let mut r = run("sweep", status);
			// Keep ordering stable under fast clocks.
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
			r.started_at = Utc::now();
			repo.insert_run(&r).await.unwrap();
		}

		assert_eq!(repo.consecutive_failures("sweep").await.unwrap(), 2);
	}
}
