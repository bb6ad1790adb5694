// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Append-only audit log of mutating operations on the management surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::task::{fmt_ts, parse_ts};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
	pub id: String,
	pub actor: String,
	pub action: String,
	pub resource: String,
	pub detail: Option<serde_json::Value>,
	pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditRepository {
	pool: SqlitePool,
}

impl AuditRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, detail))]
	pub async fn record(
		&self,
		actor: &str,
		action: &str,
		resource: &str,
		detail: Option<serde_json::Value>,
	) -> Result<String> {
		let id = Uuid::new_v4().to_string();
		sqlx::query(
			"INSERT INTO audit_log (id, actor, action, resource, detail, created_at) VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(&id)
		.bind(actor)
		.bind(action)
		.bind(resource)
		.bind(detail.map(|d| d.to_string()))
		.bind(fmt_ts(Utc::now()))
		.execute(&self.pool)
		.await?;

		Ok(id)
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
		let rows = sqlx::query_as::<_, (String, String, String, String, Option<String>, String)>(
			"SELECT id, actor, action, resource, detail, created_at FROM audit_log ORDER BY created_at DESC LIMIT ?",
		)
		.bind(limit.max(1))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(|(id, actor, action, resource, detail, created_at)| {
				Ok(AuditEntry {
					id,
					actor,
					action,
					resource,
					detail: detail.as_deref().map(serde_json::from_str).transpose()?,
					created_at: parse_ts(&created_at)?,
				})
			})
			.collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM audit_log WHERE created_at < ?")
			.bind(fmt_ts(cutoff))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}
