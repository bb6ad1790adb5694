// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Additive schema migrations driven by a `schema_version` key in `meta`.
//!
//! Every step is `CREATE TABLE IF NOT EXISTS` or a best-effort
//! `ALTER TABLE ADD COLUMN`, so replaying against a database that is
//! already current is harmless.

use sqlx::SqlitePool;

use crate::error::{DbError, Result};

const CURRENT_SCHEMA_VERSION: i64 = 3;

/// Run all pending migrations.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS meta (
			key TEXT PRIMARY KEY,
			value TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	let mut version = schema_version(pool).await?;

	while version < CURRENT_SCHEMA_VERSION {
		let next = version + 1;
		tracing::info!(from = version, to = next, "applying schema migration");
		match next {
			1 => migrate_to_v1(pool).await?,
			2 => migrate_to_v2(pool).await?,
			3 => migrate_to_v3(pool).await?,
			other => {
				return Err(DbError::Internal(format!(
					"no migration step for schema version {other}"
				)))
			}
		}
		set_schema_version(pool, next).await?;
		version = next;
	}

	tracing::debug!(version, "schema is current");
	Ok(())
}

/// Read the current schema version (0 if never migrated).
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
	let row = sqlx::query_as::<_, (String,)>("SELECT value FROM meta WHERE key = 'schema_version'")
		.fetch_optional(pool)
		.await?;

	match row {
		Some((value,)) => value
			.parse::<i64>()
			.map_err(|e| DbError::Internal(format!("invalid schema_version '{value}': {e}"))),
		None => Ok(0),
	}
}

async fn set_schema_version(pool: &SqlitePool, version: i64) -> Result<()> {
	sqlx::query(
		r#"
		INSERT INTO meta (key, value) VALUES ('schema_version', ?)
		ON CONFLICT(key) DO UPDATE SET value = excluded.value
		"#,
	)
	.bind(version.to_string())
	.execute(pool)
	.await?;
	Ok(())
}

async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS tasks (
			id TEXT PRIMARY KEY,
			task_type TEXT NOT NULL,
			params TEXT NOT NULL,
			caller_id TEXT,
			callback_url TEXT,
			response_channel TEXT,
			response_thread TEXT,
			project_id TEXT,
			session_key TEXT,
			ttl_ms INTEGER,
			status TEXT NOT NULL,
			result TEXT,
			error TEXT,
			created_at TEXT NOT NULL,
			started_at TEXT,
			completed_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)")
		.execute(pool)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS pending_approvals (
			id TEXT PRIMARY KEY,
			task_id TEXT NOT NULL,
			caller_id TEXT,
			permission TEXT NOT NULL,
			action TEXT NOT NULL,
			resource TEXT NOT NULL,
			channel TEXT,
			thread_ts TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS session_contexts (
			session_id TEXT PRIMARY KEY,
			channel TEXT NOT NULL,
			thread_ts TEXT,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS thread_sessions (
			channel TEXT NOT NULL,
			thread_ts TEXT NOT NULL,
			session_key TEXT NOT NULL,
			project_id TEXT,
			created_at TEXT NOT NULL,
			last_message_at TEXT NOT NULL,
			PRIMARY KEY (channel, thread_ts)
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS dead_letters (
			id TEXT PRIMARY KEY,
			channel TEXT NOT NULL,
			thread_ts TEXT,
			payload TEXT NOT NULL,
			error TEXT NOT NULL,
			retry_count INTEGER NOT NULL DEFAULT 0,
			next_retry_at TEXT,
			created_at TEXT NOT NULL,
			resolved_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS audit_log (
			id TEXT PRIMARY KEY,
			actor TEXT NOT NULL,
			action TEXT NOT NULL,
			resource TEXT NOT NULL,
			detail TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	Ok(())
}

async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS projects (
			id TEXT PRIMARY KEY,
			slug TEXT NOT NULL UNIQUE,
			name TEXT NOT NULL,
			description TEXT NOT NULL DEFAULT '',
			repo_url TEXT NOT NULL DEFAULT '',
			status TEXT NOT NULL DEFAULT 'active',
			owner TEXT NOT NULL DEFAULT '',
			active_session TEXT NOT NULL,
			session_version INTEGER NOT NULL DEFAULT 1,
			auto_drive INTEGER NOT NULL DEFAULT 0,
			drive_interval_ms INTEGER NOT NULL DEFAULT 0,
			report_interval_ms INTEGER NOT NULL DEFAULT 0,
			current_phase TEXT NOT NULL DEFAULT '',
			phases TEXT NOT NULL DEFAULT '',
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL,
			archived_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS project_memory (
			id TEXT PRIMARY KEY,
			project_id TEXT NOT NULL,
			kind TEXT NOT NULL,
			content TEXT NOT NULL,
			session_key TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_project_memory_project ON project_memory(project_id)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS project_events (
			id TEXT PRIMARY KEY,
			project_id TEXT NOT NULL,
			event_type TEXT NOT NULL,
			actor TEXT NOT NULL,
			summary TEXT NOT NULL,
			metadata TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_project_events_project ON project_events(project_id)")
		.execute(pool)
		.await?;

	Ok(())
}

async fn migrate_to_v3(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS job_definitions (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL,
			description TEXT NOT NULL,
			interval_secs INTEGER,
			enabled INTEGER NOT NULL DEFAULT 1,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS job_runs (
			id TEXT PRIMARY KEY,
			job_id TEXT NOT NULL,
			status TEXT NOT NULL,
			started_at TEXT NOT NULL,
			completed_at TEXT,
			duration_ms INTEGER,
			error TEXT,
			retry_count INTEGER NOT NULL DEFAULT 0,
			triggered_by TEXT NOT NULL,
			detail TEXT
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS session_cleanup (
			id TEXT PRIMARY KEY,
			session_key TEXT NOT NULL,
			reason TEXT NOT NULL,
			cleaned_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	// Columns added after the projects table first shipped. The ALTERs are
	// best-effort because a database created at v2 by a newer binary may
	// already carry them.
	for ddl in [
		"ALTER TABLE projects ADD COLUMN report_channel TEXT NOT NULL DEFAULT ''",
		"ALTER TABLE projects ADD COLUMN report_thread TEXT NOT NULL DEFAULT ''",
		"ALTER TABLE projects ADD COLUMN auto_drive_until TEXT",
		"ALTER TABLE projects ADD COLUMN phase_models TEXT NOT NULL DEFAULT '{}'",
	] {
		if let Err(e) = sqlx::query(ddl).execute(pool).await {
			tracing::debug!(error = %e, ddl, "skipping additive column");
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use sqlx::SqlitePool;

	#[tokio::test]
	async fn test_migrations_from_empty() {
		let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
		run_migrations(&pool).await.unwrap();
		assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
	}

	#[tokio::test]
	async fn test_migrations_are_idempotent() {
		let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();
		assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
	}

	#[tokio::test]
	async fn test_v3_columns_exist() {
		let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
		run_migrations(&pool).await.unwrap();

		// Insertion exercising every v3 column fails if any ALTER was skipped
		// on a fresh database.
		sqlx::query(
			r#"
			INSERT INTO projects (id, slug, name, active_session, report_channel, report_thread, auto_drive_until, phase_models, created_at, updated_at)
			VALUES ('p1', 'demo', 'Demo', 'agent:main:project-demo', 'C1', '', NULL, '{}', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')
			"#,
		)
		.execute(&pool)
		.await
		.unwrap();
	}
}
