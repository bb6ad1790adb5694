// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Project CRUD and auto-drive HTTP handlers, mirroring the chat router's
//! command set.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

use drover_server_chat::parse_phases;
use drover_server_projects::{
	AutoDriveSettings, MemoryKind, Project, ProjectStatus,
};

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ProjectResponse {
	pub id: String,
	pub slug: String,
	pub name: String,
	pub description: String,
	pub repo_url: String,
	pub status: String,
	pub owner: String,
	pub active_session: String,
	pub session_version: i64,
	pub auto_drive: bool,
	pub drive_interval_ms: i64,
	pub report_interval_ms: i64,
	pub report_channel: String,
	pub report_thread: String,
	pub current_phase: String,
	pub phases: String,
	pub auto_drive_until: Option<DateTime<Utc>>,
	pub phase_models: HashMap<String, String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub archived_at: Option<DateTime<Utc>>,
}

impl From<Project> for ProjectResponse {
	fn from(p: Project) -> Self {
		Self {
			id: p.id,
			slug: p.slug,
			name: p.name,
			description: p.description,
			repo_url: p.repo_url,
			status: p.status.as_str().to_string(),
			owner: p.owner,
			active_session: p.active_session,
			session_version: p.session_version,
			auto_drive: p.auto_drive,
			drive_interval_ms: p.drive_interval_ms,
			report_interval_ms: p.report_interval_ms,
			report_channel: p.report_channel,
			report_thread: p.report_thread,
			current_phase: p.current_phase,
			phases: p.phases,
			auto_drive_until: p.auto_drive_until,
			phase_models: p.phase_models,
			created_at: p.created_at,
			updated_at: p.updated_at,
			archived_at: p.archived_at,
		}
	}
}

async fn lookup(state: &AppState, slug: &str) -> Result<Project> {
	state
		.project_repo
		.get_project(slug)
		.await
		.map_err(ServerError::from)?
		.ok_or_else(|| ServerError::NotFound(format!("project not found: {slug}")))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateProjectRequest {
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub repo_url: String,
	#[serde(default)]
	pub owner: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/projects",
	request_body = CreateProjectRequest,
	responses(
		(status = 201, description = "Project created", body = ProjectResponse),
		(status = 400, description = "Invalid or reserved name"),
		(status = 409, description = "Slug already exists"),
	),
	tag = "projects"
)]
#[instrument(skip(state, auth, body), fields(name = %body.name))]
pub async fn create(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>)> {
	auth.require(Role::Operator)?;

	let project = state
		.project_repo
		.create_project(&body.name, &body.description, &body.repo_url, &body.owner)
		.await?;
	state
		.project_repo
		.add_event(
			&project.id,
			"project_created",
			&auth.actor,
			&format!("Project `{}` created", project.slug),
			None,
		)
		.await?;

	Ok((StatusCode::CREATED, Json(project.into())))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProjectsParams {
	pub status: Option<String>,
	pub owner: Option<String>,
}

#[utoipa::path(
	get,
	path = "/api/v1/projects",
	responses((status = 200, description = "Projects", body = [ProjectResponse])),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn list(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Query(params): Query<ListProjectsParams>,
) -> Result<Json<Vec<ProjectResponse>>> {
	auth.require(Role::Readonly)?;

	let status = params
		.status
		.as_deref()
		.filter(|s| !s.is_empty())
		.map(|s| {
			s.parse::<ProjectStatus>()
				.map_err(|e| ServerError::validation("invalid_status", e))
		})
		.transpose()?;

	let projects = state
		.project_repo
		.list_projects(status, params.owner.as_deref().filter(|o| !o.is_empty()))
		.await?;
	Ok(Json(projects.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
	get,
	path = "/api/v1/projects/{slug}",
	responses(
		(status = 200, description = "Project", body = ProjectResponse),
		(status = 404, description = "Unknown slug"),
	),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn get_project(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Readonly)?;
	Ok(Json(lookup(&state, &slug).await?.into()))
}

#[utoipa::path(
	delete,
	path = "/api/v1/projects/{slug}",
	responses(
		(status = 204, description = "Project deleted"),
		(status = 404, description = "Unknown slug"),
	),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn delete(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<StatusCode> {
	auth.require(Role::Operator)?;

	let project = lookup(&state, &slug).await?;
	state.drive.stop(&project.id).await;
	state.project_repo.delete_project(&slug).await?;

	if let Err(e) = state
		.audit_repo
		.record(&auth.actor, "project.delete", &format!("project/{slug}"), None)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}

	Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/archive",
	responses((status = 200, description = "Project archived", body = ProjectResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn archive(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Operator)?;

	let project = lookup(&state, &slug).await?;
	state.drive.stop(&project.id).await;
	let archived = state.project_repo.archive_project(&slug).await?;
	state
		.project_repo
		.add_event(
			&archived.id,
			"project_archived",
			&auth.actor,
			&format!("Project `{}` archived", archived.slug),
			None,
		)
		.await?;

	Ok(Json(archived.into()))
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/resume",
	responses(
		(status = 200, description = "Project resumed", body = ProjectResponse),
		(status = 409, description = "Project is not archived"),
	),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn resume(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Operator)?;

	let resumed = state.project_manager.resume_project(&slug, &auth.actor).await?;
	Ok(Json(resumed.into()))
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct DriveRequest {
	pub drive_interval_ms: Option<i64>,
	pub report_interval_ms: Option<i64>,
	/// `Phase[:model]` list, comma separated.
	pub phases: Option<String>,
	pub duration_ms: Option<i64>,
	pub report_channel: Option<String>,
	pub report_thread: Option<String>,
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/drive",
	request_body = DriveRequest,
	responses((status = 200, description = "Auto-drive enabled", body = ProjectResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth, body))]
pub async fn drive(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
	Json(body): Json<DriveRequest>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Operator)?;

	let project = lookup(&state, &slug).await?;
	if project.status == ProjectStatus::Archived {
		return Err(ServerError::Conflict(format!(
			"project {slug} is archived; resume it first"
		)));
	}

	let drive_interval_ms = body
		.drive_interval_ms
		.filter(|ms| *ms > 0)
		.or(Some(project.drive_interval_ms).filter(|ms| *ms > 0))
		.unwrap_or(state.config.drive.default_interval_ms);
	let report_interval_ms = body
		.report_interval_ms
		.unwrap_or(project.report_interval_ms);

	let (phases, phase_models) = match body.phases.as_deref().filter(|p| !p.is_empty()) {
		Some(spec) => {
			let parsed = parse_phases(spec);
			(parsed.phases, parsed.models)
		}
		None => (project.phases.clone(), project.phase_models.clone()),
	};
	let current_phase = if !project.current_phase.is_empty() {
		project.current_phase.clone()
	} else {
		phases.split(',').next().unwrap_or("").trim().to_string()
	};
	let auto_drive_until = match body.duration_ms.filter(|ms| *ms > 0) {
		Some(ms) => Some(Utc::now() + chrono::Duration::milliseconds(ms)),
		None => project.auto_drive_until,
	};

	let updated = state
		.project_repo
		.update_auto_drive(
			&slug,
			&AutoDriveSettings {
				enabled: true,
				drive_interval_ms,
				report_interval_ms,
				phases,
				current_phase,
				auto_drive_until,
				report_channel: body
					.report_channel
					.filter(|c| !c.is_empty())
					.unwrap_or_else(|| project.report_channel.clone()),
				report_thread: body
					.report_thread
					.filter(|t| !t.is_empty())
					.unwrap_or_else(|| project.report_thread.clone()),
				phase_models,
			},
		)
		.await?;

	state.drive.start(&updated).await?;
	state
		.project_repo
		.add_event(
			&updated.id,
			"auto_drive_started",
			&auth.actor,
			"Auto-drive started",
			Some(serde_json::json!({
				"drive_interval_ms": updated.drive_interval_ms,
				"report_interval_ms": updated.report_interval_ms,
			})),
		)
		.await?;

	Ok(Json(updated.into()))
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/pause",
	responses((status = 200, description = "Auto-drive paused", body = ProjectResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn pause(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Operator)?;

	let project = lookup(&state, &slug).await?;
	state.drive.stop(&project.id).await;

	let updated = state
		.project_repo
		.update_auto_drive(
			&slug,
			&AutoDriveSettings {
				enabled: false,
				drive_interval_ms: project.drive_interval_ms,
				report_interval_ms: project.report_interval_ms,
				phases: project.phases.clone(),
				current_phase: project.current_phase.clone(),
				auto_drive_until: project.auto_drive_until,
				report_channel: project.report_channel.clone(),
				report_thread: project.report_thread.clone(),
				phase_models: project.phase_models.clone(),
			},
		)
		.await?;

	Ok(Json(updated.into()))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PhaseRequest {
	pub phase: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/phase",
	request_body = PhaseRequest,
	responses((status = 200, description = "Phase updated", body = ProjectResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth, body))]
pub async fn phase(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
	Json(body): Json<PhaseRequest>,
) -> Result<Json<ProjectResponse>> {
	auth.require(Role::Operator)?;

	if body.phase.is_empty() {
		return Err(ServerError::validation("missing_phase", "phase is required"));
	}
	let updated = state.project_repo.update_phase(&slug, &body.phase).await?;
	state
		.project_repo
		.add_event(
			&updated.id,
			"phase_changed",
			&auth.actor,
			&format!("Phase set to {}", body.phase),
			None,
		)
		.await?;
	Ok(Json(updated.into()))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddMemoryRequest {
	/// decision | blocker | summary | context_carry
	pub kind: String,
	pub content: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MemoryResponse {
	pub id: String,
	pub kind: String,
	pub content: String,
	pub session_key: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[utoipa::path(
	post,
	path = "/api/v1/projects/{slug}/memory",
	request_body = AddMemoryRequest,
	responses((status = 201, description = "Memory appended", body = MemoryResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth, body))]
pub async fn add_memory(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
	Json(body): Json<AddMemoryRequest>,
) -> Result<(StatusCode, Json<MemoryResponse>)> {
	auth.require(Role::Operator)?;

	let kind: MemoryKind = body
		.kind
		.parse()
		.map_err(|e: String| ServerError::validation("invalid_memory_kind", e))?;
	if body.content.is_empty() {
		return Err(ServerError::validation("missing_content", "content is required"));
	}

	let project = lookup(&state, &slug).await?;
	let entry = state
		.project_repo
		.add_memory(&project.id, kind, &body.content, Some(&project.active_session))
		.await?;

	Ok((
		StatusCode::CREATED,
		Json(MemoryResponse {
			id: entry.id,
			kind: entry.kind.as_str().to_string(),
			content: entry.content,
			session_key: entry.session_key,
			created_at: entry.created_at,
		}),
	))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMemoryParams {
	pub kind: Option<String>,
}

#[utoipa::path(
	get,
	path = "/api/v1/projects/{slug}/memory",
	responses((status = 200, description = "Memory entries", body = [MemoryResponse])),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn list_memory(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
	Query(params): Query<ListMemoryParams>,
) -> Result<Json<Vec<MemoryResponse>>> {
	auth.require(Role::Readonly)?;

	let kind = params
		.kind
		.as_deref()
		.filter(|k| !k.is_empty())
		.map(|k| {
			k.parse::<MemoryKind>()
				.map_err(|e| ServerError::validation("invalid_memory_kind", e))
		})
		.transpose()?;

	let project = lookup(&state, &slug).await?;
	let entries = state.project_repo.list_memory(&project.id, kind).await?;
	Ok(Json(
		entries
			.into_iter()
			.map(|entry| MemoryResponse {
				id: entry.id,
				kind: entry.kind.as_str().to_string(),
				content: entry.content,
				session_key: entry.session_key,
				created_at: entry.created_at,
			})
			.collect(),
	))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EventResponse {
	pub id: String,
	pub event_type: String,
	pub actor: String,
	pub summary: String,
	pub metadata: Option<serde_json::Value>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
	pub limit: Option<i64>,
}

#[utoipa::path(
	get,
	path = "/api/v1/projects/{slug}/events",
	responses((status = 200, description = "Recent events", body = [EventResponse])),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn list_events(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
	Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<EventResponse>>> {
	auth.require(Role::Readonly)?;

	let project = lookup(&state, &slug).await?;
	let events = state
		.project_repo
		.list_events(&project.id, params.limit.unwrap_or(20).clamp(1, 100))
		.await?;
	Ok(Json(
		events
			.into_iter()
			.map(|event| EventResponse {
				id: event.id,
				event_type: event.event_type,
				actor: event.actor,
				summary: event.summary,
				metadata: event.metadata,
				created_at: event.created_at,
			})
			.collect(),
	))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProjectStatsResponse {
	pub decisions: i64,
	pub blockers: i64,
	pub summaries: i64,
	pub events: i64,
	pub tasks: i64,
}

#[utoipa::path(
	get,
	path = "/api/v1/projects/{slug}/stats",
	responses((status = 200, description = "Aggregated counts", body = ProjectStatsResponse)),
	tag = "projects"
)]
#[instrument(skip(state, auth))]
pub async fn stats(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(slug): Path<String>,
) -> Result<Json<ProjectStatsResponse>> {
	auth.require(Role::Readonly)?;

	let project = lookup(&state, &slug).await?;
	let stats = state.project_repo.get_project_stats(&project.id).await?;
	Ok(Json(ProjectStatsResponse {
		decisions: stats.decisions,
		blockers: stats.blockers,
		summaries: stats.summaries,
		events: stats.events,
		tasks: stats.tasks,
	}))
}
