// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Session context store.
//!
//! Maps a caller's session id (typically `chat-<channel>`) to the chat
//! location replies should route to. Entries live in memory with a TTL and
//! write through to the durable store; reads fall back to the store on a
//! miss. This is how asynchronously completed tasks learn where to reply.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use drover_server_db::{SessionContextRepository, SessionContextRow};

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
	pub session_id: String,
	pub channel: String,
	pub thread_ts: Option<String>,
	pub updated_at: DateTime<Utc>,
}

impl SessionContext {
	pub fn new(session_id: impl Into<String>, channel: impl Into<String>) -> Self {
		Self {
			session_id: session_id.into(),
			channel: channel.into(),
			thread_ts: None,
			updated_at: Utc::now(),
		}
	}

	fn from_row(row: SessionContextRow) -> Self {
		Self {
			session_id: row.session_id,
			channel: row.channel,
			thread_ts: row.thread_ts,
			updated_at: row.updated_at,
		}
	}

	fn to_row(&self) -> SessionContextRow {
		SessionContextRow {
			session_id: self.session_id.clone(),
			channel: self.channel.clone(),
			thread_ts: self.thread_ts.clone(),
			updated_at: self.updated_at,
		}
	}
}

pub struct SessionContextStore {
	ttl: Duration,
	entries: RwLock<HashMap<String, SessionContext>>,
	repo: Option<SessionContextRepository>,
}

impl SessionContextStore {
	pub fn new() -> Self {
		Self::with_ttl(Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
	}

	pub fn with_ttl(ttl: Duration) -> Self {
		Self {
			ttl,
			entries: RwLock::new(HashMap::new()),
			repo: None,
		}
	}

	pub fn with_repository(mut self, repo: SessionContextRepository) -> Self {
		self.repo = Some(repo);
		self
	}

	fn is_expired(&self, ctx: &SessionContext, now: DateTime<Utc>) -> bool {
		ctx.updated_at + self.ttl < now
	}

	/// Record (or refresh) a context. Write-through to the durable store is
	/// best-effort.
	pub async fn set(&self, mut ctx: SessionContext) {
		ctx.updated_at = Utc::now();

		if let Some(ref repo) = self.repo {
			if let Err(e) = repo.upsert(&ctx.to_row()).await {
				warn!(session_id = %ctx.session_id, error = %e, "session context write-through failed");
			}
		}

		self.entries
			.write()
			.await
			.insert(ctx.session_id.clone(), ctx);
	}

	/// Exact lookup by session id. Expired entries are treated as absent;
	/// a memory miss hydrates from the durable store.
	pub async fn get(&self, session_id: &str) -> Option<SessionContext> {
		let now = Utc::now();

		if let Some(ctx) = self.entries.read().await.get(session_id) {
			if !self.is_expired(ctx, now) {
				return Some(ctx.clone());
			}
			return None;
		}

		let repo = self.repo.as_ref()?;
		match repo.get(session_id).await {
			Ok(Some(row)) => {
				let ctx = SessionContext::from_row(row);
				if self.is_expired(&ctx, now) {
					return None;
				}
				debug!(session_id, "session context hydrated from store");
				self.entries
					.write()
					.await
					.insert(ctx.session_id.clone(), ctx.clone());
				Some(ctx)
			}
			Ok(None) => None,
			Err(e) => {
				warn!(session_id, error = %e, "session context hydration failed");
				None
			}
		}
	}

	/// Most-recently-updated non-expired context.
	///
	/// The caller id is accepted as a hint for future exact matching but is
	/// not matched today; recency is the only criterion.
	pub async fn resolve(&self, _caller_id: &str) -> Option<SessionContext> {
		let now = Utc::now();
		self.entries
			.read()
			.await
			.values()
			.filter(|ctx| !self.is_expired(ctx, now))
			.max_by_key(|ctx| ctx.updated_at)
			.cloned()
	}

	/// Exact (channel, thread) match; memory first, then the durable store.
	pub async fn get_by_thread(&self, channel: &str, thread_ts: &str) -> Option<SessionContext> {
		let now = Utc::now();

		{
			let entries = self.entries.read().await;
			let hit = entries
				.values()
				.filter(|ctx| {
					ctx.channel == channel && ctx.thread_ts.as_deref() == Some(thread_ts)
				})
				.filter(|ctx| !self.is_expired(ctx, now))
				.max_by_key(|ctx| ctx.updated_at)
				.cloned();
			if hit.is_some() {
				return hit;
			}
		}

		let repo = self.repo.as_ref()?;
		match repo.get_by_thread(channel, thread_ts).await {
			Ok(Some(row)) => {
				let ctx = SessionContext::from_row(row);
				if self.is_expired(&ctx, now) {
					None
				} else {
					Some(ctx)
				}
			}
			Ok(None) => None,
			Err(e) => {
				warn!(channel, thread_ts, error = %e, "session context thread lookup failed");
				None
			}
		}
	}

	/// Drop expired in-memory entries. Returns the number removed.
	pub async fn cleanup(&self) -> usize {
		let now = Utc::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, ctx| !self.is_expired(ctx, now));
		before - entries.len()
	}
}

impl Default for SessionContextStore {
	fn default() -> Self {
		Self::new()
	}
}
