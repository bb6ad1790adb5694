// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Task submission and lifecycle HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use drover_server_engine::{SubmitRequest, TaskFilter, TaskSnapshot, TaskStatus};

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};
use crate::pagination::PaginationParams;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmitTaskRequest {
	#[serde(rename = "type")]
	pub task_type: String,
	#[serde(default)]
	pub params: serde_json::Value,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub ttl_seconds: Option<u64>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
	pub id: String,
	#[serde(rename = "type")]
	pub task_type: String,
	pub status: String,
	pub params: serde_json::Value,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
	pub caller_id: Option<String>,
	pub callback_url: Option<String>,
	pub response_channel: Option<String>,
	pub response_thread: Option<String>,
	pub project_id: Option<String>,
	pub session_key: Option<String>,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
}

impl From<TaskSnapshot> for TaskResponse {
	fn from(snapshot: TaskSnapshot) -> Self {
		Self {
			id: snapshot.id,
			task_type: snapshot.task_type,
			status: snapshot.status.as_str().to_string(),
			params: snapshot.params,
			result: snapshot.result,
			error: snapshot.error,
			caller_id: snapshot.caller_id,
			callback_url: snapshot.callback_url,
			response_channel: snapshot.response_channel,
			response_thread: snapshot.response_thread,
			project_id: snapshot.project_id,
			session_key: snapshot.session_key,
			created_at: snapshot.created_at,
			started_at: snapshot.started_at,
			completed_at: snapshot.completed_at,
		}
	}
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TaskListResponse {
	pub tasks: Vec<TaskResponse>,
	pub total: usize,
	pub offset: usize,
	pub limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
	pub status: Option<String>,
	#[serde(rename = "type")]
	pub task_type: Option<String>,
	pub caller_id: Option<String>,
	pub limit: Option<i32>,
	pub offset: Option<i32>,
}

fn none_if_empty(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.is_empty())
}

/// Fill in response routing the caller left blank: session-context
/// resolution by caller, session key via the thread binding, and finally
/// routing embedded in the params blob.
async fn resolve_routing(state: &AppState, body: &mut SubmitTaskRequest) {
	if body.response_channel.as_deref().unwrap_or("").is_empty() {
		let caller = body.caller_id.as_deref().unwrap_or("");
		if let Some(ctx) = state.session_store.resolve(caller).await {
			body.response_channel = Some(ctx.channel);
			if body.response_thread.as_deref().unwrap_or("").is_empty() {
				body.response_thread = ctx.thread_ts;
			}
		}
	}

	if body.session_key.as_deref().unwrap_or("").is_empty() {
		if let (Some(channel), Some(thread)) = (
			body.response_channel.as_deref(),
			body.response_thread.as_deref(),
		) {
			if let Ok(Some(binding)) = state.project_repo.get_thread_binding(channel, thread).await
			{
				body.session_key = Some(binding.session_key);
				if body.project_id.as_deref().unwrap_or("").is_empty() {
					body.project_id = binding.project_id;
				}
			}
		}
	}

	if body.response_channel.as_deref().unwrap_or("").is_empty() {
		if let Some(embedded) = body.params.get("response_channel").and_then(|v| v.as_str()) {
			body.response_channel = Some(embedded.to_string());
			body.response_thread = body
				.params
				.get("response_thread")
				.and_then(|v| v.as_str())
				.map(str::to_string)
				.or(body.response_thread.take());
		}
	}
}

#[utoipa::path(
	post,
	path = "/api/v1/tasks",
	request_body = SubmitTaskRequest,
	responses(
		(status = 202, description = "Task accepted", body = TaskResponse),
		(status = 400, description = "Unknown task type"),
		(status = 503, description = "Task queue is full"),
	),
	tag = "tasks"
)]
#[instrument(skip(state, auth, body), fields(task_type = %body.task_type))]
pub async fn submit(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(mut body): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>)> {
	auth.require(Role::Operator)?;

	resolve_routing(&state, &mut body).await;

	let request = SubmitRequest {
		task_type: body.task_type.clone(),
		params: body.params,
		caller_id: none_if_empty(body.caller_id),
		callback_url: none_if_empty(body.callback_url),
		response_channel: none_if_empty(body.response_channel),
		response_thread: none_if_empty(body.response_thread),
		project_id: none_if_empty(body.project_id),
		session_key: none_if_empty(body.session_key),
		ttl: body.ttl_seconds.filter(|s| *s > 0).map(Duration::from_secs),
	};

	let snapshot = state.engine.submit(request).await?;

	state
		.metrics
		.tasks_submitted
		.with_label_values(&[&snapshot.task_type])
		.inc();
	if let Err(e) = state
		.audit_repo
		.record(
			&auth.actor,
			"task.submit",
			&format!("task/{}", snapshot.id),
			Some(serde_json::json!({"type": snapshot.task_type})),
		)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}

	Ok((StatusCode::ACCEPTED, Json(snapshot.into())))
}

#[utoipa::path(
	get,
	path = "/api/v1/tasks",
	responses((status = 200, description = "Task listing", body = TaskListResponse)),
	tag = "tasks"
)]
#[instrument(skip(state, auth))]
pub async fn list(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Query(params): Query<TaskListParams>,
) -> Result<Json<TaskListResponse>> {
	auth.require(Role::Readonly)?;

	let status = params
		.status
		.as_deref()
		.filter(|s| !s.is_empty())
		.map(|s| {
			s.parse::<TaskStatus>()
				.map_err(|e| ServerError::validation("invalid_status", e))
		})
		.transpose()?;

	let page = PaginationParams {
		limit: params.limit,
		offset: params.offset,
	};
	let offset = page.offset_or_default() as usize;
	let limit = page.limit_clamped(50, 100) as usize;

	let filter = TaskFilter {
		status,
		task_type: params.task_type,
		caller_id: params.caller_id,
		offset,
		limit,
	};
	let (tasks, total) = state.engine.list(&filter).await;

	Ok(Json(TaskListResponse {
		tasks: tasks.into_iter().map(TaskResponse::from).collect(),
		total,
		offset,
		limit,
	}))
}

#[utoipa::path(
	get,
	path = "/api/v1/tasks/{id}",
	responses(
		(status = 200, description = "Task snapshot", body = TaskResponse),
		(status = 404, description = "Unknown task id"),
	),
	tag = "tasks"
)]
#[instrument(skip(state, auth))]
pub async fn get_task(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(id): Path<String>,
) -> Result<Json<TaskResponse>> {
	auth.require(Role::Readonly)?;

	let snapshot = state
		.engine
		.get(&id)
		.await
		.ok_or_else(|| ServerError::NotFound(format!("task not found: {id}")))?;
	Ok(Json(snapshot.into()))
}

#[utoipa::path(
	delete,
	path = "/api/v1/tasks/{id}",
	responses(
		(status = 200, description = "Task cancelled", body = TaskResponse),
		(status = 404, description = "Unknown task id"),
		(status = 409, description = "Task is no longer pending"),
	),
	tag = "tasks"
)]
#[instrument(skip(state, auth))]
pub async fn cancel(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(id): Path<String>,
) -> Result<Json<TaskResponse>> {
	auth.require(Role::Operator)?;

	let snapshot = state.engine.cancel(&id).await?;
	if let Err(e) = state
		.audit_repo
		.record(&auth.actor, "task.cancel", &format!("task/{id}"), None)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}
	Ok(Json(snapshot.into()))
}
