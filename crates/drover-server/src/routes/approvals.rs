// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Approval decision HTTP handlers.
//!
//! Approve requeues the parked task; deny fails it. Either way the pending
//! approval record is consumed.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};
use crate::routes::tasks::TaskResponse;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApprovalResponse {
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

impl From<drover_server_db::PendingApproval> for ApprovalResponse {
	fn from(a: drover_server_db::PendingApproval) -> Self {
		Self {
			id: a.id,
			task_id: a.task_id,
			caller_id: a.caller_id,
			permission: a.permission,
			action: a.action,
			resource: a.resource,
			channel: a.channel,
			thread_ts: a.thread_ts,
			created_at: a.created_at,
		}
	}
}

#[utoipa::path(
	get,
	path = "/api/v1/approvals",
	responses((status = 200, description = "Pending approvals", body = [ApprovalResponse])),
	tag = "approvals"
)]
#[instrument(skip(state, auth))]
pub async fn list(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
) -> Result<Json<Vec<ApprovalResponse>>> {
	auth.require(Role::Readonly)?;

	let approvals = state.approval_repo.list().await?;
	Ok(Json(approvals.into_iter().map(Into::into).collect()))
}

async fn consume(state: &AppState, id: &str) -> Result<drover_server_db::PendingApproval> {
	state
		.approval_repo
		.get(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("approval not found: {id}")))
}

#[utoipa::path(
	post,
	path = "/api/v1/approvals/{id}/approve",
	responses(
		(status = 200, description = "Task requeued", body = TaskResponse),
		(status = 404, description = "Unknown approval id"),
		(status = 409, description = "Task is no longer awaiting approval"),
	),
	tag = "approvals"
)]
#[instrument(skip(state, auth))]
pub async fn approve(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(id): Path<String>,
) -> Result<Json<TaskResponse>> {
	auth.require(Role::Operator)?;

	let approval = consume(&state, &id).await?;
	let snapshot = state.engine.requeue(&approval.task_id).await?;
	state.approval_repo.delete(&id).await?;

	if let Err(e) = state
		.audit_repo
		.record(
			&auth.actor,
			"approval.approve",
			&format!("task/{}", approval.task_id),
			Some(serde_json::json!({"permission": approval.permission})),
		)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}

	Ok(Json(snapshot.into()))
}

#[utoipa::path(
	post,
	path = "/api/v1/approvals/{id}/deny",
	responses(
		(status = 200, description = "Task failed", body = TaskResponse),
		(status = 404, description = "Unknown approval id"),
		(status = 409, description = "Task is no longer awaiting approval"),
	),
	tag = "approvals"
)]
#[instrument(skip(state, auth))]
pub async fn deny(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Path(id): Path<String>,
) -> Result<Json<TaskResponse>> {
	auth.require(Role::Operator)?;

	let approval = consume(&state, &id).await?;
	let snapshot = state
		.engine
		.fail(&approval.task_id, "approval denied")
		.await?;
	state.approval_repo.delete(&id).await?;

	if let Err(e) = state
		.audit_repo
		.record(
			&auth.actor,
			"approval.deny",
			&format!("task/{}", approval.task_id),
			Some(serde_json::json!({"permission": approval.permission})),
		)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}

	Ok(Json(snapshot.into()))
}
