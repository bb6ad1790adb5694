// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Handler-facing error type, rendered as RFC 7807 problem details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use drover_server_engine::EngineError;
use drover_server_projects::ProjectError;

use crate::problem::Problem;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("{detail}")]
	Validation { code: &'static str, detail: String },

	#[error("{0}")]
	NotFound(String),

	#[error("{0}")]
	Conflict(String),

	#[error("rate limit exceeded")]
	RateLimited,

	#[error("{0}")]
	Capacity(String),

	#[error("{0}")]
	Unauthorized(String),

	#[error("{0}")]
	Forbidden(String),

	#[error("{0}")]
	Internal(String),
}

impl ServerError {
	pub fn validation(code: &'static str, detail: impl Into<String>) -> Self {
		ServerError::Validation {
			code,
			detail: detail.into(),
		}
	}

	fn problem(&self) -> Problem {
		match self {
			ServerError::Validation { code, detail } => Problem::new(
				StatusCode::BAD_REQUEST,
				code,
				"Invalid request",
				detail.clone(),
			),
			ServerError::NotFound(detail) => Problem::new(
				StatusCode::NOT_FOUND,
				"not_found",
				"Not found",
				detail.clone(),
			),
			ServerError::Conflict(detail) => Problem::new(
				StatusCode::CONFLICT,
				"conflict",
				"Conflict",
				detail.clone(),
			),
			ServerError::RateLimited => Problem::new(
				StatusCode::TOO_MANY_REQUESTS,
				"rate_limited",
				"Rate limit exceeded",
				"too many requests from this address",
			),
			ServerError::Capacity(detail) => Problem::new(
				StatusCode::SERVICE_UNAVAILABLE,
				"queue_full",
				"Capacity exceeded",
				detail.clone(),
			),
			ServerError::Unauthorized(detail) => Problem::new(
				StatusCode::UNAUTHORIZED,
				"unauthorized",
				"Unauthorized",
				detail.clone(),
			),
			ServerError::Forbidden(detail) => Problem::new(
				StatusCode::FORBIDDEN,
				"forbidden",
				"Forbidden",
				detail.clone(),
			),
			ServerError::Internal(detail) => {
				// Internal detail stays in the log, not the response body.
				error!(%detail, "internal server error");
				Problem::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"Internal error",
					"an internal error occurred",
				)
			}
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		self.problem().into_response()
	}
}

impl From<EngineError> for ServerError {
	fn from(e: EngineError) -> Self {
		match e {
			EngineError::InvalidTaskType(t) => {
				ServerError::validation("invalid_task_type", format!("unknown task type: {t}"))
			}
			EngineError::NotFound(id) => ServerError::NotFound(format!("task not found: {id}")),
			EngineError::QueueFull => ServerError::Capacity("task queue is full".to_string()),
			EngineError::Conflict {
				id,
				status,
				expected,
				..
			} => ServerError::Conflict(format!("task {id} is {status}: {expected}")),
			EngineError::NotRunning => ServerError::Internal("engine is not running".to_string()),
		}
	}
}

impl From<ProjectError> for ServerError {
	fn from(e: ProjectError) -> Self {
		match e {
			ProjectError::AlreadyExists(slug) => {
				ServerError::Conflict(format!("project already exists: {slug}"))
			}
			ProjectError::ReservedSlug(slug) => {
				ServerError::validation("reserved_word", format!("'{slug}' is a reserved word"))
			}
			ProjectError::InvalidName(name) => {
				ServerError::validation("invalid_name", format!("invalid project name: {name}"))
			}
			ProjectError::NotFound(slug) => {
				ServerError::NotFound(format!("project not found: {slug}"))
			}
			ProjectError::NotArchived(slug) => {
				ServerError::Conflict(format!("project {slug} is not archived"))
			}
			other => ServerError::Internal(other.to_string()),
		}
	}
}

impl From<drover_server_db::DbError> for ServerError {
	fn from(e: drover_server_db::DbError) -> Self {
		ServerError::Internal(e.to_string())
	}
}

impl From<drover_server_chat::ChatError> for ServerError {
	fn from(e: drover_server_chat::ChatError) -> Self {
		match e {
			drover_server_chat::ChatError::InvalidDuration(v) => {
				ServerError::validation("invalid_duration", format!("invalid duration: {v}"))
			}
			other => ServerError::Internal(other.to_string()),
		}
	}
}

impl From<drover_server_drive::DriveError> for ServerError {
	fn from(e: drover_server_drive::DriveError) -> Self {
		match e {
			drover_server_drive::DriveError::NoInterval(slug) => ServerError::validation(
				"no_drive_interval",
				format!("project {slug} has no drive interval configured"),
			),
			other => ServerError::Internal(other.to_string()),
		}
	}
}

pub type Result<T> = std::result::Result<T, ServerError>;
