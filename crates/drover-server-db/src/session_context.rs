// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable side of the session context store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::task::{fmt_ts, parse_ts};

/// Where replies for a caller should be routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContextRow {
	pub session_id: String,
	pub channel: String,
	pub thread_ts: Option<String>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionContextRepository {
	pool: SqlitePool,
}

impl SessionContextRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, ctx), fields(session_id = %ctx.session_id))]
	pub async fn upsert(&self, ctx: &SessionContextRow) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO session_contexts (session_id, channel, thread_ts, updated_at)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(session_id) DO UPDATE SET
				channel = excluded.channel,
				thread_ts = excluded.thread_ts,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&ctx.session_id)
		.bind(&ctx.channel)
		.bind(&ctx.thread_ts)
		.bind(fmt_ts(ctx.updated_at))
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get(&self, session_id: &str) -> Result<Option<SessionContextRow>> {
		let row = sqlx::query_as::<_, (String, String, Option<String>, String)>(
			"SELECT session_id, channel, thread_ts, updated_at FROM session_contexts WHERE session_id = ?",
		)
		.bind(session_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|(session_id, channel, thread_ts, updated_at)| {
			Ok(SessionContextRow {
				session_id,
				channel,
				thread_ts,
				updated_at: parse_ts(&updated_at)?,
			})
		})
		.transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_by_thread(
		&self,
		channel: &str,
		thread_ts: &str,
	) -> Result<Option<SessionContextRow>> {
		let row = sqlx::query_as::<_, (String, String, Option<String>, String)>(
			r#"
			SELECT session_id, channel, thread_ts, updated_at
			FROM session_contexts
			WHERE channel = ? AND thread_ts = ?
			ORDER BY updated_at DESC
			LIMIT 1
			"#,
		)
		.bind(channel)
		.bind(thread_ts)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|(session_id, channel, thread_ts, updated_at)| {
			Ok(SessionContextRow {
				session_id,
				channel,
				thread_ts,
				updated_at: parse_ts(&updated_at)?,
			})
		})
		.transpose()
	}

	/// Session ids idle since before the cutoff.
	#[tracing::instrument(skip(self))]
	pub async fn idle_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
		let rows = sqlx::query_as::<_, (String,)>(
			"SELECT session_id FROM session_contexts WHERE updated_at < ?",
		)
		.bind(fmt_ts(cutoff))
		.fetch_all(&self.pool)
		.await?;
		Ok(rows.into_iter().map(|(id,)| id).collect())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_idle_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM session_contexts WHERE updated_at < ?")
			.bind(fmt_ts(cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Record a swept session in the cleanup log.
	#[tracing::instrument(skip(self))]
	pub async fn log_cleanup(&self, session_key: &str, reason: &str) -> Result<()> {
		sqlx::query(
			"INSERT INTO session_cleanup (id, session_key, reason, cleaned_at) VALUES (?, ?, ?, ?)",
		)
		.bind(uuid::Uuid::new_v4().to_string())
		.bind(session_key)
		.bind(reason)
		.bind(fmt_ts(Utc::now()))
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}
