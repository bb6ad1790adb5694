// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pending approval requests parked by the awaiting-approval sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::task::{fmt_ts, parse_ts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
	pub id: String,
	pub task_id: String,
	pub caller_id: Option<String>,
	pub permission: String,
	pub action: String,
	pub resource: String,
	pub channel: Option<String>,
	pub thread_ts: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ApprovalRepository {
	pool: SqlitePool,
}

impl ApprovalRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, approval), fields(request_id = %approval.id))]
	pub async fn insert(&self, approval: &PendingApproval) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO pending_approvals (id, task_id, caller_id, permission, action, resource, channel, thread_ts, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&approval.id)
		.bind(&approval.task_id)
		.bind(&approval.caller_id)
		.bind(&approval.permission)
		.bind(&approval.action)
		.bind(&approval.resource)
		.bind(&approval.channel)
		.bind(&approval.thread_ts)
		.bind(fmt_ts(approval.created_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, id: &str) -> Result<Option<PendingApproval>> {
		let row = sqlx::query_as::<
			_,
			(
				String,
				String,
				Option<String>,
				String,
				String,
				String,
				Option<String>,
				Option<String>,
				String,
			),
		>(
			"SELECT id, task_id, caller_id, permission, action, resource, channel, thread_ts, created_at FROM pending_approvals WHERE id = ?",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(
			|(id, task_id, caller_id, permission, action, resource, channel, thread_ts, created_at)| {
				Ok(PendingApproval {
					id,
					task_id,
					caller_id,
					permission,
					action,
					resource,
					channel,
					thread_ts,
					created_at: parse_ts(&created_at)?,
				})
			},
		)
		.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list(&self) -> Result<Vec<PendingApproval>> {
		let rows = sqlx::query_as::<
			_,
			(
				String,
				String,
				Option<String>,
				String,
				String,
				String,
				Option<String>,
				Option<String>,
				String,
			),
		>(
			"SELECT id, task_id, caller_id, permission, action, resource, channel, thread_ts, created_at FROM pending_approvals ORDER BY created_at DESC",
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(
				|(id, task_id, caller_id, permission, action, resource, channel, thread_ts, created_at)| {
					Ok(PendingApproval {
						id,
						task_id,
						caller_id,
						permission,
						action,
						resource,
						channel,
						thread_ts,
						created_at: parse_ts(&created_at)?,
					})
				},
			)
			.collect()
	}

	/// Remove an approval once decided.
	#[tracing::instrument(skip(self))]
	pub async fn delete(&self, id: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM pending_approvals WHERE id = ?")
			.bind(id)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM pending_approvals WHERE created_at < ?")
			.bind(fmt_ts(cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}
