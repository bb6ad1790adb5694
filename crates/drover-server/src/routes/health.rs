// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Health, readiness, and metrics HTTP handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use drover_server_jobs::HealthState;
use drover_server_projects::ProjectStatus;

use crate::api::AppState;
use crate::auth_middleware::{RequireAuth, Role};
use crate::error::{Result, ServerError};
use crate::version;

/// GET /healthz - liveness probe.
pub async fn healthz() -> &'static str {
	"ok"
}

/// GET /readyz - readiness probe: the database must answer.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
	match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
		Ok(_) => (StatusCode::OK, "ready"),
		Err(e) => {
			tracing::error!(error = %e, "readiness check failed");
			(StatusCode::SERVICE_UNAVAILABLE, "database unreachable")
		}
	}
}

/// GET /metrics - Prometheus text export.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
	state
		.metrics
		.queue_depth
		.set(state.engine.queue_depth() as i64);
	state
		.metrics
		.drive_controllers
		.set(state.drive.running_count().await as i64);

	match state.metrics.gather() {
		Ok(text) => Ok((
			StatusCode::OK,
			[(
				axum::http::header::CONTENT_TYPE,
				"text/plain; version=0.0.4; charset=utf-8",
			)],
			text,
		)),
		Err(e) => Err(ServerError::Internal(format!(
			"failed to gather metrics: {e}"
		))),
	}
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ComponentHealth {
	pub status: String,
	pub detail: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
	pub status: String,
	pub version: String,
	pub uptime: String,
	pub database: ComponentHealth,
	pub engine: ComponentHealth,
	pub jobs: ComponentHealth,
	pub chat: ComponentHealth,
	pub forge: ComponentHealth,
}

#[utoipa::path(
	get,
	path = "/api/v1/health",
	responses(
		(status = 200, description = "System healthy or degraded", body = HealthResponse),
		(status = 503, description = "System unhealthy", body = HealthResponse),
	),
	tag = "health"
)]
#[instrument(skip(state, auth))]
pub async fn api_health(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
) -> Result<impl IntoResponse> {
	auth.require(Role::Readonly)?;

	let database = match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
		Ok(_) => ComponentHealth {
			status: "healthy".to_string(),
			detail: "reachable".to_string(),
		},
		Err(e) => ComponentHealth {
			status: "unhealthy".to_string(),
			detail: e.to_string(),
		},
	};

	let engine = if state.engine.is_running() {
		ComponentHealth {
			status: "healthy".to_string(),
			detail: format!(
				"{} workers, {} queued",
				state.engine.worker_count(),
				state.engine.queue_depth()
			),
		}
	} else {
		ComponentHealth {
			status: "unhealthy".to_string(),
			detail: "engine is not running".to_string(),
		}
	};

	let jobs = match &state.scheduler {
		Some(scheduler) => {
			let health = scheduler.health_status().await;
			let status = match health.status {
				HealthState::Healthy => "healthy",
				HealthState::Degraded => "degraded",
				HealthState::Unhealthy => "unhealthy",
			};
			ComponentHealth {
				status: status.to_string(),
				detail: format!("{} jobs registered", health.jobs.len()),
			}
		}
		None => ComponentHealth {
			status: "degraded".to_string(),
			detail: "scheduler not started".to_string(),
		},
	};

	let chat = ComponentHealth {
		status: "healthy".to_string(),
		detail: if state.config.integrations.chat_configured() {
			"configured".to_string()
		} else {
			"not configured (logging fallback)".to_string()
		},
	};
	let forge = ComponentHealth {
		status: "healthy".to_string(),
		detail: if state.config.integrations.forge_configured() {
			"configured".to_string()
		} else {
			"not configured".to_string()
		},
	};

	let overall = if database.status == "unhealthy" || engine.status == "unhealthy" {
		"unhealthy"
	} else if jobs.status != "healthy" {
		"degraded"
	} else {
		"healthy"
	};

	let uptime = (chrono::Utc::now() - state.started_at)
		.to_std()
		.unwrap_or_default();
	let response = HealthResponse {
		status: overall.to_string(),
		version: version::VERSION.to_string(),
		uptime: humantime::format_duration(std::time::Duration::from_secs(uptime.as_secs()))
			.to_string(),
		database,
		engine,
		jobs,
		chat,
		forge,
	};

	let code = if overall == "unhealthy" {
		StatusCode::SERVICE_UNAVAILABLE
	} else {
		StatusCode::OK
	};
	Ok((code, Json(response)))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MetricsSummaryResponse {
	pub tasks_total: usize,
	pub tasks_by_status: std::collections::HashMap<String, usize>,
	pub tasks_by_type: std::collections::HashMap<String, usize>,
	pub avg_task_duration_ms: f64,
	pub queue_depth: usize,
	pub workers: usize,
	pub active_projects: usize,
	pub driving_projects: usize,
}

#[utoipa::path(
	get,
	path = "/api/v1/metrics/summary",
	responses((status = 200, description = "Aggregated metrics", body = MetricsSummaryResponse)),
	tag = "health"
)]
#[instrument(skip(state, auth))]
pub async fn metrics_summary(
	State(state): State<AppState>,
	RequireAuth(auth): RequireAuth,
) -> Result<Json<MetricsSummaryResponse>> {
	auth.require(Role::Readonly)?;

	let stats = state.engine.stats().await;
	let active_projects = state
		.project_repo
		.list_projects(Some(ProjectStatus::Active), None)
		.await?
		.len();

	Ok(Json(MetricsSummaryResponse {
		tasks_total: stats.total,
		tasks_by_status: stats.by_status,
		tasks_by_type: stats.by_type,
		avg_task_duration_ms: stats.avg_duration_ms,
		queue_depth: state.engine.queue_depth(),
		workers: state.engine.worker_count(),
		active_projects,
		driving_projects: state.drive.running_count().await,
	}))
}
