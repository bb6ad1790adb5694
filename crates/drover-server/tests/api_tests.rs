// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Handler-level integration tests over the full router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use drover_server::chat_bridge::{LoggingForwarder, LoggingResponder};
use drover_server::{create_app_state, create_router, AppState};
use drover_server_config::{AuthConfig, ServerConfig};
use drover_server_db::testing::create_test_pool;

async fn state_with_config(config: ServerConfig) -> AppState {
	let pool = create_test_pool().await;
	create_app_state(
		pool,
		config,
		Arc::new(LoggingForwarder),
		Arc::new(LoggingResponder),
		None,
	)
	.await
}

fn open_config() -> ServerConfig {
	let mut config = ServerConfig {
		auth: AuthConfig {
			mode: "none".to_string(),
			readonly_key: String::new(),
			operator_key: String::new(),
			admin_key: String::new(),
		},
		..Default::default()
	};
	// Polling loops in these tests exceed the production default.
	config.http.rate_limit_rps = 1000.0;
	config.http.rate_limit_burst = 1000;
	config
}

async fn open_state() -> AppState {
	state_with_config(open_config()).await
}

async fn send(
	app: &Router,
	method: &str,
	uri: &str,
	body: Option<serde_json::Value>,
	bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
	let mut builder = Request::builder().method(method).uri(uri);
	if let Some(token) = bearer {
		builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
	}
	let request = match body {
		Some(value) => builder
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(value.to_string()))
			.unwrap(),
		None => builder.body(Body::empty()).unwrap(),
	};

	let response = app.clone().oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	let value = if bytes.is_empty() {
		serde_json::Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
	};
	(status, value)
}

#[tokio::test]
async fn test_probes_and_request_id() {
	let state = open_state().await;
	let app = create_router(state);

	let response = app
		.clone()
		.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().contains_key("x-request-id"));

	let (status, _) = send(&app, "GET", "/readyz", None, None).await;
	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_submit_noop_runs_to_completion() {
	let state = open_state().await;
	state.engine.start().await.unwrap();
	let app = create_router(state);

	let (status, task) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop", "params": {"x": 1}})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(task["status"], "pending");
	let id = task["id"].as_str().unwrap().to_string();

	let mut done = serde_json::Value::Null;
	for _ in 0..100 {
		let (status, current) = send(&app, "GET", &format!("/api/v1/tasks/{id}"), None, None).await;
		assert_eq!(status, StatusCode::OK);
		if current["status"] == "completed" {
			done = current;
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(done["status"], "completed", "task never completed");
	assert_eq!(done["result"]["message"], "Task type noop executed (no-op)");
	assert!(done["error"].is_null());
}

#[tokio::test]
async fn test_unknown_type_is_problem_detail() {
	let state = open_state().await;
	let app = create_router(state);

	let (status, body) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "bogus.kind"})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["type"], "urn:drover:error:invalid_task_type");
	assert_eq!(body["status"], 400);
	assert!(body["detail"].as_str().unwrap().contains("bogus.kind"));
}

#[tokio::test]
async fn test_queue_full_returns_503() {
	let mut config = open_config();
	config.engine.queue_capacity = 1;
	// Workers never started: the queue fills immediately.
	let state = state_with_config(config).await;
	let app = create_router(state);

	let body = serde_json::json!({"type": "noop"});
	let (status, _) = send(&app, "POST", "/api/v1/tasks", Some(body.clone()), None).await;
	assert_eq!(status, StatusCode::ACCEPTED);

	let (status, problem) = send(&app, "POST", "/api/v1/tasks", Some(body), None).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(problem["type"], "urn:drover:error:queue_full");

	// The rejected task exists in failed state.
	let (_, listing) = send(&app, "GET", "/api/v1/tasks?status=failed", None, None).await;
	assert_eq!(listing["total"], 1);
	assert_eq!(listing["tasks"][0]["error"], "task queue is full");
}

#[tokio::test]
async fn test_cancel_then_conflict() {
	let state = open_state().await;
	let app = create_router(state);

	let (_, task) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop"})),
		None,
	)
	.await;
	let id = task["id"].as_str().unwrap();

	let (status, cancelled) =
		send(&app, "DELETE", &format!("/api/v1/tasks/{id}"), None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(cancelled["status"], "cancelled");

	let (status, problem) =
		send(&app, "DELETE", &format!("/api/v1/tasks/{id}"), None, None).await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert!(problem["detail"].as_str().unwrap().contains("cancelled"));
}

#[tokio::test]
async fn test_list_pagination_beyond_total() {
	let state = open_state().await;
	let app = create_router(state);

	for _ in 0..3 {
		send(
			&app,
			"POST",
			"/api/v1/tasks",
			Some(serde_json::json!({"type": "noop"})),
			None,
		)
		.await;
	}

	let (status, listing) =
		send(&app, "GET", "/api/v1/tasks?offset=50&limit=10", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(listing["total"], 3);
	assert_eq!(listing["tasks"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_context_registration_routes_replies() {
	let state = open_state().await;
	let app = create_router(state);

	let (status, _) = send(
		&app,
		"POST",
		"/api/v1/context",
		Some(serde_json::json!({"channel": "C9", "thread_ts": "7.7"})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::NO_CONTENT);

	// A submission with no explicit routing picks up the registered context.
	let (_, task) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop", "caller_id": "caller-1"})),
		None,
	)
	.await;
	assert_eq!(task["response_channel"], "C9");
	assert_eq!(task["response_thread"], "7.7");
}

#[tokio::test]
async fn test_project_lifecycle_over_http() {
	let state = open_state().await;
	let app = create_router(state);

	let (status, project) = send(
		&app,
		"POST",
		"/api/v1/projects",
		Some(serde_json::json!({"name": "Leader Election", "repo_url": "https://x/y"})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::CREATED);
	assert_eq!(project["slug"], "leader-election");
	assert_eq!(project["active_session"], "agent:main:project-leader-election");

	let (status, problem) = send(
		&app,
		"POST",
		"/api/v1/projects",
		Some(serde_json::json!({"name": "Leader Election"})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);
	assert!(problem["detail"].as_str().unwrap().contains("already exists"));

	let (status, problem) = send(
		&app,
		"POST",
		"/api/v1/projects",
		Some(serde_json::json!({"name": "Drive"})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(problem["type"], "urn:drover:error:reserved_word");

	let (status, archived) = send(
		&app,
		"POST",
		"/api/v1/projects/leader-election/archive",
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(archived["status"], "archived");

	let (status, resumed) = send(
		&app,
		"POST",
		"/api/v1/projects/leader-election/resume",
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(resumed["status"], "active");
	assert_eq!(resumed["session_version"], 2);
	assert_eq!(
		resumed["active_session"],
		"agent:main:project-leader-election-v2"
	);

	// Resume of a non-archived project conflicts.
	let (status, _) = send(
		&app,
		"POST",
		"/api/v1/projects/leader-election/resume",
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_drive_and_pause_over_http() {
	let state = open_state().await;
	let app = create_router(state.clone());

	send(
		&app,
		"POST",
		"/api/v1/projects",
		Some(serde_json::json!({"name": "Demo"})),
		None,
	)
	.await;

	let (status, driven) = send(
		&app,
		"POST",
		"/api/v1/projects/demo/drive",
		Some(serde_json::json!({
			"drive_interval_ms": 60000,
			"report_interval_ms": 300000,
			"phases": "Analysis:opus,Build",
			"duration_ms": 3600000,
		})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(driven["auto_drive"], true);
	assert_eq!(driven["current_phase"], "Analysis");
	assert_eq!(driven["phase_models"]["Analysis"], "opus");

	let project_id = driven["id"].as_str().unwrap();
	assert!(state.drive.running(project_id).await);

	let (status, paused) =
		send(&app, "POST", "/api/v1/projects/demo/pause", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(paused["auto_drive"], false);
	// Intervals survive the pause.
	assert_eq!(paused["drive_interval_ms"], 60000);
	assert!(!state.drive.running(project_id).await);
}

#[tokio::test]
async fn test_chat_event_creates_project() {
	let state = open_state().await;
	let app = create_router(state);

	let (status, _) = send(
		&app,
		"POST",
		"/api/v1/chat/events",
		Some(serde_json::json!({
			"channel": "C1",
			"user": "alice",
			"text": "new project \"Chat Made\"",
			"message_ts": "1.1",
		})),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::ACCEPTED);

	let (status, project) = send(&app, "GET", "/api/v1/projects/chat-made", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(project["name"], "Chat Made");
}

#[tokio::test]
async fn test_auth_roles() {
	let mut config = open_config();
	config.auth = AuthConfig {
		mode: "token".to_string(),
		readonly_key: "ro-key".to_string(),
		operator_key: "op-key".to_string(),
		admin_key: "admin-key".to_string(),
	};
	let state = state_with_config(config).await;
	let app = create_router(state);

	// No token.
	let (status, problem) = send(&app, "GET", "/api/v1/tasks", None, None).await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(problem["type"], "urn:drover:error:unauthorized");

	// Readonly can list but not submit.
	let (status, _) = send(&app, "GET", "/api/v1/tasks", None, Some("ro-key")).await;
	assert_eq!(status, StatusCode::OK);
	let (status, _) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop"})),
		Some("ro-key"),
	)
	.await;
	assert_eq!(status, StatusCode::FORBIDDEN);

	// Operator can submit but not patch config.
	let (status, _) = send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop"})),
		Some("op-key"),
	)
	.await;
	assert_eq!(status, StatusCode::ACCEPTED);
	let (status, _) = send(
		&app,
		"PATCH",
		"/api/v1/config",
		Some(serde_json::json!({"rate_limit_rps": 50.0})),
		Some("op-key"),
	)
	.await;
	assert_eq!(status, StatusCode::FORBIDDEN);

	// Admin can patch.
	let (status, updated) = send(
		&app,
		"PATCH",
		"/api/v1/config",
		Some(serde_json::json!({"rate_limit_rps": 50.0})),
		Some("admin-key"),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(updated["rate_limit_rps"], 50.0);

	// Probes bypass auth.
	let (status, _) = send(&app, "GET", "/healthz", None, None).await;
	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_and_summary() {
	let state = open_state().await;
	state.engine.start().await.unwrap();
	let app = create_router(state);

	send(
		&app,
		"POST",
		"/api/v1/tasks",
		Some(serde_json::json!({"type": "noop"})),
		None,
	)
	.await;

	let response = app
		.clone()
		.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let text = String::from_utf8(
		axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap()
			.to_vec(),
	)
	.unwrap();
	assert!(text.contains("drover_tasks_submitted_total"));

	let (status, summary) = send(&app, "GET", "/api/v1/metrics/summary", None, None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(summary["tasks_total"], 1);
	assert_eq!(summary["workers"], 4);
}
