// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! RFC 7807 problem details.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub const CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Problem {
	#[serde(rename = "type")]
	pub problem_type: String,
	pub title: String,
	pub status: u16,
	pub detail: String,
	pub instance: String,
}

impl Problem {
	pub fn new(status: StatusCode, code: &str, title: &str, detail: impl Into<String>) -> Self {
		Self {
			problem_type: format!("urn:drover:error:{code}"),
			title: title.to_string(),
			status: status.as_u16(),
			detail: detail.into(),
			instance: String::new(),
		}
	}

	pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
		self.instance = instance.into();
		self
	}
}

impl IntoResponse for Problem {
	fn into_response(self) -> Response {
		let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let body = serde_json::to_string(&self).unwrap_or_else(|_| "{}".to_string());
		(status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_problem_shape() {
		let problem = Problem::new(
			StatusCode::SERVICE_UNAVAILABLE,
			"queue_full",
			"Queue full",
			"task queue is full",
		);
		let value = serde_json::to_value(&problem).unwrap();
		assert_eq!(value["type"], "urn:drover:error:queue_full");
		assert_eq!(value["status"], 503);
		assert_eq!(value["detail"], "task queue is full");
	}
}
