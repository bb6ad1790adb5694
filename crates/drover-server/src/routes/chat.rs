// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Chat convenience and webhook-binding handlers.
//!
//! `/chat` submits a send-message task; `/chat/events` and `/chat/actions`
//! are the transport-agnostic entry points a chat SDK adapter posts
//! inbound traffic into.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use drover_server_engine::SubmitRequest;

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};
use crate::routes::tasks::TaskResponse;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SendChatRequest {
	pub channel: String,
	pub text: String,
	pub thread_ts: Option<String>,
}

#[utoipa::path(
	post,
	path = "/api/v1/chat",
	request_body = SendChatRequest,
	responses((status = 202, description = "Send-message task accepted", body = TaskResponse)),
	tag = "chat"
)]
#[instrument(skip(state, auth, body), fields(channel = %body.channel))]
pub async fn send(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<SendChatRequest>,
) -> Result<(StatusCode, Json<TaskResponse>)> {
	auth.require(Role::Operator)?;

	if body.channel.is_empty() || body.text.is_empty() {
		return Err(ServerError::validation(
			"missing_field",
			"channel and text are required",
		));
	}

	let snapshot = state
		.engine
		.submit(SubmitRequest {
			task_type: "slack.send-message".to_string(),
			params: serde_json::json!({
				"channel": body.channel,
				"text": body.text,
				"thread_ts": body.thread_ts,
			}),
			caller_id: Some(auth.actor.clone()),
			..Default::default()
		})
		.await?;

	Ok((StatusCode::ACCEPTED, Json(snapshot.into())))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatEventRequest {
	pub channel: String,
	pub user: String,
	pub text: String,
	pub thread_ts: Option<String>,
	pub message_ts: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/chat/events",
	request_body = ChatEventRequest,
	responses((status = 202, description = "Message routed")),
	tag = "chat"
)]
#[instrument(skip(state, auth, body), fields(channel = %body.channel))]
pub async fn event(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<ChatEventRequest>,
) -> Result<StatusCode> {
	auth.require(Role::Operator)?;

	state
		.router
		.handle_message(
			&body.channel,
			&body.user,
			&body.text,
			body.thread_ts.as_deref().filter(|t| !t.is_empty()),
			&body.message_ts,
		)
		.await?;

	Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChatActionRequest {
	pub action_id: String,
	pub user: String,
	pub channel: String,
	pub thread_ts: Option<String>,
	#[serde(default)]
	pub message_ts: String,
}

#[utoipa::path(
	post,
	path = "/api/v1/chat/actions",
	request_body = ChatActionRequest,
	responses((status = 202, description = "Action handled")),
	tag = "chat"
)]
#[instrument(skip(state, auth, body), fields(action_id = %body.action_id))]
pub async fn action(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<ChatActionRequest>,
) -> Result<StatusCode> {
	auth.require(Role::Operator)?;

	state
		.router
		.handle_action(
			&body.action_id,
			&body.user,
			&body.channel,
			body.thread_ts.as_deref().filter(|t| !t.is_empty()),
			&body.message_ts,
		)
		.await?;

	Ok(StatusCode::ACCEPTED)
}
