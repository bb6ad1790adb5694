// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! OpenAPI document for the management surface.

use utoipa::OpenApi;

use crate::problem::Problem;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::tasks::submit,
		routes::tasks::list,
		routes::tasks::get_task,
		routes::tasks::cancel,
		routes::context::register,
		routes::chat::send,
		routes::chat::event,
		routes::chat::action,
		routes::approvals::list,
		routes::approvals::approve,
		routes::approvals::deny,
		routes::projects::create,
		routes::projects::list,
		routes::projects::get_project,
		routes::projects::delete,
		routes::projects::archive,
		routes::projects::resume,
		routes::projects::drive,
		routes::projects::pause,
		routes::projects::phase,
		routes::projects::add_memory,
		routes::projects::list_memory,
		routes::projects::list_events,
		routes::projects::stats,
		routes::health::api_health,
		routes::health::metrics_summary,
		routes::config::get_config,
		routes::config::patch_config,
	),
	components(schemas(
		Problem,
		routes::tasks::SubmitTaskRequest,
		routes::tasks::TaskResponse,
		routes::tasks::TaskListResponse,
		routes::context::RegisterContextRequest,
		routes::chat::SendChatRequest,
		routes::chat::ChatEventRequest,
		routes::chat::ChatActionRequest,
		routes::approvals::ApprovalResponse,
		routes::projects::CreateProjectRequest,
		routes::projects::ProjectResponse,
		routes::projects::DriveRequest,
		routes::projects::PhaseRequest,
		routes::projects::AddMemoryRequest,
		routes::projects::MemoryResponse,
		routes::projects::EventResponse,
		routes::projects::ProjectStatsResponse,
		routes::health::HealthResponse,
		routes::health::MetricsSummaryResponse,
		routes::config::ConfigResponse,
		routes::config::PatchConfigRequest,
	)),
	tags(
		(name = "tasks", description = "Task submission and lifecycle"),
		(name = "projects", description = "Project workspaces and auto-drive"),
		(name = "approvals", description = "Human approval decisions"),
		(name = "chat", description = "Chat bindings"),
		(name = "context", description = "Session context registration"),
		(name = "health", description = "Health and metrics"),
		(name = "config", description = "Configuration"),
	)
)]
pub struct ApiDoc;
