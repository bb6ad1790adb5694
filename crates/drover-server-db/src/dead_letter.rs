// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Chat messages that failed delivery, parked for the retry worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::task::{fmt_ts, parse_opt_ts, parse_ts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
	pub id: String,
	pub channel: String,
	pub thread_ts: Option<String>,
	pub payload: String,
	pub error: String,
	pub retry_count: i64,
	pub next_retry_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct DeadLetterRepository {
	pool: SqlitePool,
}

type DeadLetterTuple = (
	String,
	String,
	Option<String>,
	String,
	String,
	i64,
	Option<String>,
	String,
	Option<String>,
);

fn from_tuple(t: DeadLetterTuple) -> Result<DeadLetter> {
	let (id, channel, thread_ts, payload, error, retry_count, next_retry_at, created_at, resolved_at) =
		t;
	Ok(DeadLetter {
		id,
		channel,
		thread_ts,
		payload,
		error,
		retry_count,
		next_retry_at: parse_opt_ts(next_retry_at)?,
		created_at: parse_ts(&created_at)?,
		resolved_at: parse_opt_ts(resolved_at)?,
	})
}

impl DeadLetterRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Park a failed post. Returns the dead letter id.
	#[tracing::instrument(skip(self, payload))]
	pub async fn park(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		payload: &str,
		error: &str,
		next_retry_at: DateTime<Utc>,
	) -> Result<String> {
		let id = Uuid::new_v4().to_string();
		sqlx::query(
			r#"
			INSERT INTO dead_letters (id, channel, thread_ts, payload, error, retry_count, next_retry_at, created_at)
			VALUES (?, ?, ?, ?, ?, 0, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(channel)
		.bind(thread_ts)
		.bind(payload)
		.bind(error)
		.bind(fmt_ts(next_retry_at))
		.bind(fmt_ts(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(id)
	}

	/// Unresolved letters whose retry time has come.
	#[tracing::instrument(skip(self))]
	pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<DeadLetter>> {
		let rows = sqlx::query_as::<_, DeadLetterTuple>(
			r#"
			SELECT id, channel, thread_ts, payload, error, retry_count, next_retry_at, created_at, resolved_at
			FROM dead_letters
			WHERE resolved_at IS NULL AND (next_retry_at IS NULL OR next_retry_at <= ?)
			ORDER BY created_at ASC
			"#,
		)
		.bind(fmt_ts(now))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(from_tuple).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn mark_resolved(&self, id: &str) -> Result<()> {
		sqlx::query("UPDATE dead_letters SET resolved_at = ? WHERE id = ?")
			.bind(fmt_ts(Utc::now()))
			.bind(id)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn bump_retry(
		&self,
		id: &str,
		error: &str,
		next_retry_at: DateTime<Utc>,
	) -> Result<()> {
		sqlx::query(
			"UPDATE dead_letters SET retry_count = retry_count + 1, error = ?, next_retry_at = ? WHERE id = ?",
		)
		.bind(error)
		.bind(fmt_ts(next_retry_at))
		.bind(id)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result =
			sqlx::query("DELETE FROM dead_letters WHERE resolved_at IS NOT NULL AND resolved_at < ?")
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

	#[tokio::test]
	async fn test_park_due_resolve() {
		let pool = create_test_pool().await;
		let repo = DeadLetterRepository::new(pool);

		let id = repo
			.park("C1", Some("1.1"), "hello", "rate limited", Utc::now())
			.await
			.unwrap();

		let due = repo.due(Utc::now()).await.unwrap();
		assert_eq!(due.len(), 1);
		assert_eq!(due[0].id, id);
		assert_eq!(due[0].retry_count, 0);

		repo.mark_resolved(&id).await.unwrap();
		assert!(repo.due(Utc::now()).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_bump_retry_defers() {
		let pool = create_test_pool().await;
		let repo = DeadLetterRepository::new(pool);

		let id = repo
			.park("C1", None, "hello", "timeout", Utc::now())
			.await
			.unwrap();

		repo.bump_retry(&id, "timeout again", Utc::now() + chrono::Duration::minutes(5))
			.await
			.unwrap();

		// Not yet due again.
		assert!(repo.due(Utc::now()).await.unwrap().is_empty());

		let later = Utc::now() + chrono::Duration::minutes(6);
		let due = repo.due(later).await.unwrap();
		assert_eq!(due.len(), 1);
		assert_eq!(due[0].retry_count, 1);
		assert_eq!(due[0].error, "timeout again");
	}

	#[tokio::test]
	async fn test_delete_resolved_before() {
		let pool = create_test_pool().await;
		let repo = DeadLetterRepository::new(pool.clone());

		let id = repo
			.park("C1", None, "hello", "boom", Utc::now())
			.await
			.unwrap();
		repo.mark_resolved(&id).await.unwrap();

		// Nothing resolved before yesterday.
		let deleted = repo
			.delete_resolved_before(Utc::now() - chrono::Duration::days(1))
			.await
			.unwrap();
		assert_eq!(deleted, 0);

		let deleted = repo
			.delete_resolved_before(Utc::now() + chrono::Duration::seconds(1))
			.await
			.unwrap();
		assert_eq!(deleted, 1);
	}
}
