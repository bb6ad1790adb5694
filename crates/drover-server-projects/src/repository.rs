// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Project persistence: CRUD, memory, events, stats, thread bindings.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ProjectError, Result};
use crate::slug::{generate_slug, is_reserved};
use crate::types::{
	AutoDriveSettings, MemoryEntry, MemoryKind, Project, ProjectEvent, ProjectStats,
	ProjectStatus, ThreadBinding,
};

fn fmt_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| ProjectError::Internal(format!("invalid timestamp '{value}': {e}")))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.as_deref().map(parse_ts).transpose()
}

#[derive(Clone)]
pub struct ProjectRepository {
	pool: SqlitePool,
}

impl ProjectRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Create a project. The slug is derived from the name; reserved words
	/// and duplicates are rejected with well-known errors.
	#[tracing::instrument(skip(self))]
	pub async fn create_project(
		&self,
		name: &str,
		description: &str,
		repo_url: &str,
		owner: &str,
	) -> Result<Project> {
		let slug = generate_slug(name);
		if slug.is_empty() {
			return Err(ProjectError::InvalidName(name.to_string()));
		}
		if is_reserved(&slug) {
			return Err(ProjectError::ReservedSlug(slug));
		}
		if self.get_project(&slug).await?.is_some() {
			return Err(ProjectError::AlreadyExists(slug));
		}

		let now = Utc::now();
		let project = Project {
			id: Uuid::new_v4().to_string(),
			slug: slug.clone(),
			name: name.to_string(),
			description: description.to_string(),
			repo_url: repo_url.to_string(),
			status: ProjectStatus::Active,
			owner: owner.to_string(),
			active_session: crate::manager::session_key(&slug, 1),
			session_version: 1,
			auto_drive: false,
			drive_interval_ms: 0,
			report_interval_ms: 0,
			report_channel: String::new(),
			report_thread: String::new(),
			current_phase: String::new(),
			phases: String::new(),
			auto_drive_until: None,
			phase_models: HashMap::new(),
			created_at: now,
			updated_at: now,
			archived_at: None,
		};

		sqlx::query(
			r#"
			INSERT INTO projects (
				id, slug, name, description, repo_url, status, owner,
				active_session, session_version, auto_drive, drive_interval_ms,
				report_interval_ms, report_channel, report_thread, current_phase,
				phases, auto_drive_until, phase_models, created_at, updated_at, archived_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&project.id)
		.bind(&project.slug)
		.bind(&project.name)
		.bind(&project.description)
		.bind(&project.repo_url)
		.bind(project.status.as_str())
		.bind(&project.owner)
		.bind(&project.active_session)
		.bind(project.session_version)
		.bind(project.auto_drive)
		.bind(project.drive_interval_ms)
		.bind(project.report_interval_ms)
		.bind(&project.report_channel)
		.bind(&project.report_thread)
		.bind(&project.current_phase)
		.bind(&project.phases)
		.bind(project.auto_drive_until.map(fmt_ts))
		.bind(serde_json::to_string(&project.phase_models)?)
		.bind(fmt_ts(project.created_at))
		.bind(fmt_ts(project.updated_at))
		.bind(project.archived_at.map(fmt_ts))
		.execute(&self.pool)
		.await?;

		tracing::info!(slug = %project.slug, "project created");
		Ok(project)
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_project(&self, slug: &str) -> Result<Option<Project>> {
		let row = sqlx::query("SELECT * FROM projects WHERE slug = ?")
			.bind(slug)
			.fetch_optional(&self.pool)
			.await?;
		row.map(|r| project_from_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_project_by_id(&self, id: &str) -> Result<Option<Project>> {
		let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;
		row.map(|r| project_from_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_projects(
		&self,
		status: Option<ProjectStatus>,
		owner: Option<&str>,
	) -> Result<Vec<Project>> {
		let mut sql = String::from("SELECT * FROM projects WHERE 1=1");
		if status.is_some() {
			sql.push_str(" AND status = ?");
		}
		if owner.is_some() {
			sql.push_str(" AND owner = ?");
		}
		sql.push_str(" ORDER BY created_at ASC");

		let mut query = sqlx::query(&sql);
		if let Some(status) = status {
			query = query.bind(status.as_str());
		}
		if let Some(owner) = owner {
			query = query.bind(owner);
		}

		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(project_from_row).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_auto_drive_projects(&self) -> Result<Vec<Project>> {
		let rows =
			sqlx::query("SELECT * FROM projects WHERE auto_drive = 1 AND status = 'active'")
				.fetch_all(&self.pool)
				.await?;
		rows.iter().map(project_from_row).collect()
	}

	/// Full-row update keyed by id.
	#[tracing::instrument(skip(self, project), fields(slug = %project.slug))]
	pub async fn update_project(&self, project: &Project) -> Result<()> {
		let result = sqlx::query(
			r#"
			UPDATE projects SET
				name = ?, description = ?, repo_url = ?, status = ?, owner = ?,
				active_session = ?, session_version = ?, auto_drive = ?,
				drive_interval_ms = ?, report_interval_ms = ?, report_channel = ?,
				report_thread = ?, current_phase = ?, phases = ?, auto_drive_until = ?,
				phase_models = ?, updated_at = ?, archived_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&project.name)
		.bind(&project.description)
		.bind(&project.repo_url)
		.bind(project.status.as_str())
		.bind(&project.owner)
		.bind(&project.active_session)
		.bind(project.session_version)
		.bind(project.auto_drive)
		.bind(project.drive_interval_ms)
		.bind(project.report_interval_ms)
		.bind(&project.report_channel)
		.bind(&project.report_thread)
		.bind(&project.current_phase)
		.bind(&project.phases)
		.bind(project.auto_drive_until.map(fmt_ts))
		.bind(serde_json::to_string(&project.phase_models)?)
		.bind(fmt_ts(Utc::now()))
		.bind(project.archived_at.map(fmt_ts))
		.bind(&project.id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(ProjectError::NotFound(project.slug.clone()));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn archive_project(&self, slug: &str) -> Result<Project> {
		let mut project = self
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;

		project.status = ProjectStatus::Archived;
		project.archived_at = Some(Utc::now());
		project.auto_drive = false;
		self.update_project(&project).await?;
		tracing::info!(slug, "project archived");
		Ok(project)
	}

	/// Remove a project and everything hanging off it, transactionally:
	/// tasks are unlinked, thread bindings, memory, and events removed.
	#[tracing::instrument(skip(self))]
	pub async fn delete_project(&self, slug: &str) -> Result<()> {
		let project = self
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;

		let mut tx = self.pool.begin().await?;

		sqlx::query("UPDATE tasks SET project_id = NULL WHERE project_id = ?")
			.bind(&project.id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM thread_sessions WHERE project_id = ?")
			.bind(&project.id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM project_memory WHERE project_id = ?")
			.bind(&project.id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM project_events WHERE project_id = ?")
			.bind(&project.id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM projects WHERE id = ?")
			.bind(&project.id)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		tracing::info!(slug, "project deleted");
		Ok(())
	}

	#[tracing::instrument(skip(self, settings))]
	pub async fn update_auto_drive(&self, slug: &str, settings: &AutoDriveSettings) -> Result<Project> {
		let mut project = self
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;

		project.auto_drive = settings.enabled;
		project.drive_interval_ms = settings.drive_interval_ms;
		project.report_interval_ms = settings.report_interval_ms;
		project.phases = settings.phases.clone();
		project.current_phase = settings.current_phase.clone();
		project.auto_drive_until = settings.auto_drive_until;
		project.report_channel = settings.report_channel.clone();
		project.report_thread = settings.report_thread.clone();
		project.phase_models = settings.phase_models.clone();
		self.update_project(&project).await?;
		Ok(project)
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_phase(&self, slug: &str, phase: &str) -> Result<Project> {
		let mut project = self
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;
		project.current_phase = phase.to_string();
		self.update_project(&project).await?;
		Ok(project)
	}

	#[tracing::instrument(skip(self, models))]
	pub async fn update_phase_models(
		&self,
		slug: &str,
		models: HashMap<String, String>,
	) -> Result<Project> {
		let mut project = self
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;
		project.phase_models = models;
		self.update_project(&project).await?;
		Ok(project)
	}

	#[tracing::instrument(skip(self))]
	pub async fn update_active_session(
		&self,
		slug: &str,
		session_key: &str,
		session_version: i64,
	) -> Result<()> {
		let result = sqlx::query(
			"UPDATE projects SET active_session = ?, session_version = ?, updated_at = ? WHERE slug = ?",
		)
		.bind(session_key)
		.bind(session_version)
		.bind(fmt_ts(Utc::now()))
		.bind(slug)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(ProjectError::NotFound(slug.to_string()));
		}
		Ok(())
	}

	/// Bump updated_at, marking activity.
	#[tracing::instrument(skip(self))]
	pub async fn touch_project(&self, slug: &str) -> Result<()> {
		sqlx::query("UPDATE projects SET updated_at = ? WHERE slug = ?")
			.bind(fmt_ts(Utc::now()))
			.bind(slug)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self, content))]
	pub async fn add_memory(
		&self,
		project_id: &str,
		kind: MemoryKind,
		content: &str,
		session_key: Option<&str>,
	) -> Result<MemoryEntry> {
		let entry = MemoryEntry {
			id: Uuid::new_v4().to_string(),
			project_id: project_id.to_string(),
			kind,
			content: content.to_string(),
			session_key: session_key.map(str::to_string),
			created_at: Utc::now(),
		};

		sqlx::query(
			"INSERT INTO project_memory (id, project_id, kind, content, session_key, created_at) VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(&entry.id)
		.bind(&entry.project_id)
		.bind(entry.kind.as_str())
		.bind(&entry.content)
		.bind(&entry.session_key)
		.bind(fmt_ts(entry.created_at))
		.execute(&self.pool)
		.await?;

		Ok(entry)
	}

	/// Chronological memory, optionally filtered by kind.
	#[tracing::instrument(skip(self))]
	pub async fn list_memory(
		&self,
		project_id: &str,
		kind: Option<MemoryKind>,
	) -> Result<Vec<MemoryEntry>> {
		let mut sql = String::from(
			"SELECT id, project_id, kind, content, session_key, created_at FROM project_memory WHERE project_id = ?",
		);
		if kind.is_some() {
			sql.push_str(" AND kind = ?");
		}
		sql.push_str(" ORDER BY created_at ASC");

		let mut query = sqlx::query_as::<_, (String, String, String, String, Option<String>, String)>(&sql)
			.bind(project_id);
		if let Some(kind) = kind {
			query = query.bind(kind.as_str());
		}

		let rows = query.fetch_all(&self.pool).await?;
		rows.into_iter()
			.map(|(id, project_id, kind, content, session_key, created_at)| {
				Ok(MemoryEntry {
					id,
					project_id,
					kind: kind.parse().map_err(ProjectError::Internal)?,
					content,
					session_key,
					created_at: parse_ts(&created_at)?,
				})
			})
			.collect()
	}

	#[tracing::instrument(skip(self, metadata))]
	pub async fn add_event(
		&self,
		project_id: &str,
		event_type: &str,
		actor: &str,
		summary: &str,
		metadata: Option<serde_json::Value>,
	) -> Result<ProjectEvent> {
		let event = ProjectEvent {
			id: Uuid::new_v4().to_string(),
			project_id: project_id.to_string(),
			event_type: event_type.to_string(),
			actor: actor.to_string(),
			summary: summary.to_string(),
			metadata,
			created_at: Utc::now(),
		};

		sqlx::query(
			"INSERT INTO project_events (id, project_id, event_type, actor, summary, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&event.id)
		.bind(&event.project_id)
		.bind(&event.event_type)
		.bind(&event.actor)
		.bind(&event.summary)
		.bind(event.metadata.as_ref().map(|m| m.to_string()))
		.bind(fmt_ts(event.created_at))
		.execute(&self.pool)
		.await?;

		Ok(event)
	}

	/// Most recent events first.
	#[tracing::instrument(skip(self))]
	pub async fn list_events(&self, project_id: &str, limit: i64) -> Result<Vec<ProjectEvent>> {
		let rows = sqlx::query_as::<
			_,
			(String, String, String, String, String, Option<String>, String),
		>(
			"SELECT id, project_id, event_type, actor, summary, metadata, created_at FROM project_events WHERE project_id = ? ORDER BY created_at DESC LIMIT ?",
		)
		.bind(project_id)
		.bind(limit.max(1))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(
				|(id, project_id, event_type, actor, summary, metadata, created_at)| {
					Ok(ProjectEvent {
						id,
						project_id,
						event_type,
						actor,
						summary,
						metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
						created_at: parse_ts(&created_at)?,
					})
				},
			)
			.collect()
	}

	/// One aggregation round-trip for the dashboard.
	#[tracing::instrument(skip(self))]
	pub async fn get_project_stats(&self, project_id: &str) -> Result<ProjectStats> {
		let (decisions, blockers, summaries, events, tasks): (i64, i64, i64, i64, i64) =
			sqlx::query_as(
				r#"
				SELECT
					(SELECT COUNT(*) FROM project_memory WHERE project_id = ?1 AND kind = 'decision'),
					(SELECT COUNT(*) FROM project_memory WHERE project_id = ?1 AND kind = 'blocker'),
					(SELECT COUNT(*) FROM project_memory WHERE project_id = ?1 AND kind IN ('summary', 'context_carry')),
					(SELECT COUNT(*) FROM project_events WHERE project_id = ?1),
					(SELECT COUNT(*) FROM tasks WHERE project_id = ?1)
				"#,
			)
			.bind(project_id)
			.fetch_one(&self.pool)
			.await?;

		Ok(ProjectStats {
			decisions,
			blockers,
			summaries,
			events,
			tasks,
		})
	}

	/// Upsert: re-binding a (channel, thread) replaces the previous binding.
	#[tracing::instrument(skip(self))]
	pub async fn bind_thread(
		&self,
		channel: &str,
		thread_ts: &str,
		session_key: &str,
		project_id: Option<&str>,
	) -> Result<()> {
		let now = fmt_ts(Utc::now());
		sqlx::query(
			r#"
			INSERT INTO thread_sessions (channel, thread_ts, session_key, project_id, created_at, last_message_at)
			VALUES (?, ?, ?, ?, ?, ?)
			ON CONFLICT(channel, thread_ts) DO UPDATE SET
				session_key = excluded.session_key,
				project_id = excluded.project_id,
				last_message_at = excluded.last_message_at
			"#,
		)
		.bind(channel)
		.bind(thread_ts)
		.bind(session_key)
		.bind(project_id)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_thread_binding(
		&self,
		channel: &str,
		thread_ts: &str,
	) -> Result<Option<ThreadBinding>> {
		let row = sqlx::query_as::<_, (String, String, String, Option<String>, String, String)>(
			"SELECT channel, thread_ts, session_key, project_id, created_at, last_message_at FROM thread_sessions WHERE channel = ? AND thread_ts = ?",
		)
		.bind(channel)
		.bind(thread_ts)
		.fetch_optional(&self.pool)
		.await?;

		row.map(
			|(channel, thread_ts, session_key, project_id, created_at, last_message_at)| {
				Ok(ThreadBinding {
					channel,
					thread_ts,
					session_key,
					project_id,
					created_at: parse_ts(&created_at)?,
					last_message_at: parse_ts(&last_message_at)?,
				})
			},
		)
		.transpose()
	}

	/// The project a thread is bound to, if any.
	#[tracing::instrument(skip(self))]
	pub async fn get_project_by_thread(
		&self,
		channel: &str,
		thread_ts: &str,
	) -> Result<Option<Project>> {
		let row = sqlx::query(
			r#"
			SELECT p.* FROM projects p
			JOIN thread_sessions t ON t.project_id = p.id
			WHERE t.channel = ? AND t.thread_ts = ?
			"#,
		)
		.bind(channel)
		.bind(thread_ts)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| project_from_row(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn touch_thread(&self, channel: &str, thread_ts: &str) -> Result<()> {
		sqlx::query(
			"UPDATE thread_sessions SET last_message_at = ? WHERE channel = ? AND thread_ts = ?",
		)
		.bind(fmt_ts(Utc::now()))
		.bind(channel)
		.bind(thread_ts)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_threads_idle_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM thread_sessions WHERE last_message_at < ?")
			.bind(fmt_ts(cutoff))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
	let status: String = row.try_get("status")?;
	let phase_models: String = row.try_get("phase_models")?;
	let created_at: String = row.try_get("created_at")?;
	let updated_at: String = row.try_get("updated_at")?;
	let auto_drive_until: Option<String> = row.try_get("auto_drive_until")?;
	let archived_at: Option<String> = row.try_get("archived_at")?;

	Ok(Project {
		id: row.try_get("id")?,
		slug: row.try_get("slug")?,
		name: row.try_get("name")?,
		description: row.try_get("description")?,
		repo_url: row.try_get("repo_url")?,
		status: status.parse().map_err(ProjectError::Internal)?,
		owner: row.try_get("owner")?,
		active_session: row.try_get("active_session")?,
		session_version: row.try_get("session_version")?,
		auto_drive: row.try_get("auto_drive")?,
		drive_interval_ms: row.try_get("drive_interval_ms")?,
		report_interval_ms: row.try_get("report_interval_ms")?,
		report_channel: row.try_get("report_channel")?,
		report_thread: row.try_get("report_thread")?,
		current_phase: row.try_get("current_phase")?,
		phases: row.try_get("phases")?,
		auto_drive_until: parse_opt_ts(auto_drive_until)?,
		phase_models: serde_json::from_str(&phase_models)?,
		created_at: parse_ts(&created_at)?,
		updated_at: parse_ts(&updated_at)?,
		archived_at: parse_opt_ts(archived_at)?,
	})
}
