// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Session-context registration for response routing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use drover_server_sessions::SessionContext;

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterContextRequest {
	pub session_id: Option<String>,
	pub channel: String,
	pub thread_ts: Option<String>,
}

#[utoipa::path(
	post,
	path = "/api/v1/context",
	request_body = RegisterContextRequest,
	responses((status = 204, description = "Context registered")),
	tag = "context"
)]
#[instrument(skip(state, auth, body), fields(channel = %body.channel))]
pub async fn register(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<RegisterContextRequest>,
) -> Result<StatusCode> {
	auth.require(Role::Operator)?;

	if body.channel.is_empty() {
		return Err(ServerError::validation("missing_channel", "channel is required"));
	}

	let session_id = body
		.session_id
		.filter(|s| !s.is_empty())
		.unwrap_or_else(|| format!("chat-{}", body.channel));

	let mut ctx = SessionContext::new(session_id, body.channel);
	ctx.thread_ts = body.thread_ts.filter(|t| !t.is_empty());
	state.session_store.set(ctx).await;

	Ok(StatusCode::NO_CONTENT)
}
