// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration view and the mutable runtime subset.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};
use crate::version;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConfigResponse {
	pub version: String,
	pub host: String,
	pub port: u16,
	pub auth_mode: String,
	pub workers: usize,
	pub queue_capacity: usize,
	pub task_timeout_secs: u64,
	pub rate_limit_rps: f64,
	pub rate_limit_burst: u32,
	pub log_level: String,
	pub drive_default_interval_ms: i64,
	pub retention_task_days: i64,
	pub chat_configured: bool,
	pub forge_configured: bool,
}

#[utoipa::path(
	get,
	path = "/api/v1/config",
	responses((status = 200, description = "Effective configuration", body = ConfigResponse)),
	tag = "config"
)]
#[instrument(skip(state, auth))]
pub async fn get_config(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
) -> Result<Json<ConfigResponse>> {
	auth.require(Role::Readonly)?;

	let runtime = state.runtime.read().await;
	Ok(Json(ConfigResponse {
		version: version::VERSION.to_string(),
		host: state.config.http.host.clone(),
		port: state.config.http.port,
		auth_mode: state.config.auth.mode.clone(),
		workers: state.config.engine.workers,
		queue_capacity: state.config.engine.queue_capacity,
		task_timeout_secs: state.config.engine.task_timeout_secs,
		rate_limit_rps: runtime.rate_limit_rps,
		rate_limit_burst: state.config.http.rate_limit_burst,
		log_level: runtime.log_level.clone(),
		drive_default_interval_ms: state.config.drive.default_interval_ms,
		retention_task_days: state.config.retention.completed_task_days,
		chat_configured: state.config.integrations.chat_configured(),
		forge_configured: state.config.integrations.forge_configured(),
	}))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PatchConfigRequest {
	pub log_level: Option<String>,
	pub rate_limit_rps: Option<f64>,
}

#[utoipa::path(
	patch,
	path = "/api/v1/config",
	request_body = PatchConfigRequest,
	responses(
		(status = 200, description = "Configuration updated", body = ConfigResponse),
		(status = 403, description = "Admin role required"),
	),
	tag = "config"
)]
#[instrument(skip(state, auth, body))]
pub async fn patch_config(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
	Json(body): Json<PatchConfigRequest>,
) -> Result<Json<ConfigResponse>> {
	auth.require(Role::Admin)?;

	if let Some(rps) = body.rate_limit_rps {
		if rps <= 0.0 {
			return Err(ServerError::validation(
				"invalid_rate_limit",
				"rate_limit_rps must be positive",
			));
		}
		state.runtime.write().await.rate_limit_rps = rps;
		info!(rps, "rate limit updated");
	}

	if let Some(ref level) = body.log_level {
		let filter: tracing_subscriber::EnvFilter = level
			.parse()
			.map_err(|_| ServerError::validation("invalid_log_level", format!("'{level}' is not a valid filter")))?;
		if let Some(ref handle) = state.log_reload {
			handle
				.reload(filter)
				.map_err(|e| ServerError::Internal(format!("log reload failed: {e}")))?;
		}
		state.runtime.write().await.log_level = level.clone();
		info!(level = %level, "log level updated");
	}

	if let Err(e) = state
		.audit_repo
		.record(
			&auth.actor,
			"config.patch",
			"config",
			Some(serde_json::json!({
				"log_level": body.log_level,
				"rate_limit_rps": body.rate_limit_rps,
			})),
		)
		.await
	{
		tracing::warn!(error = %e, "audit write failed");
	}

	get_config(State(state), RequireAuth(auth)).await
}
