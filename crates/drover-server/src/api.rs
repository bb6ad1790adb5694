// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Application state, wiring, and the router.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use drover_server_callback::CallbackConfig;
use drover_server_chat::{
	ApprovalPrompter, ChatCompletionNotifier, Forwarder, MessageRouter, Responder,
};
use drover_server_config::ServerConfig;
use drover_server_db::{
	ApprovalRepository, AuditRepository, DeadLetterRepository, JobRepository,
	SessionContextRepository, TaskRepository,
};
use drover_server_drive::DriveController;
use drover_server_engine::{EngineConfig, TaskEngine};
use drover_server_jobs::JobScheduler;
use drover_server_projects::{ProjectManager, ProjectRepository};
use drover_server_sessions::SessionContextStore;

use crate::auth_middleware::auth_middleware;
use crate::executor::{NoopHandler, RegistryExecutor, SendMessageHandler};
use crate::metrics::Metrics;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::request_id::request_id_middleware;
use crate::routes;

/// Handle for runtime log-level changes via PATCH /api/v1/config.
pub type LogReloadHandle =
	tracing_subscriber::reload::Handle<tracing_subscriber::EnvFilter, tracing_subscriber::Registry>;

/// The mutable subset of configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	pub log_level: String,
	pub rate_limit_rps: f64,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<ServerConfig>,
	pub runtime: Arc<RwLock<RuntimeConfig>>,
	pub pool: SqlitePool,
	pub engine: TaskEngine,
	pub task_repo: Arc<TaskRepository>,
	pub approval_repo: Arc<ApprovalRepository>,
	pub audit_repo: Arc<AuditRepository>,
	pub dead_letter_repo: Arc<DeadLetterRepository>,
	pub session_store: Arc<SessionContextStore>,
	pub project_repo: ProjectRepository,
	pub project_manager: ProjectManager,
	pub drive: DriveController,
	pub router: Arc<MessageRouter>,
	pub job_repo: Arc<JobRepository>,
	pub scheduler: Option<Arc<JobScheduler>>,
	pub metrics: Arc<Metrics>,
	pub rate_limiter: Arc<RateLimiter>,
	pub log_reload: Option<LogReloadHandle>,
	pub started_at: DateTime<Utc>,
}

/// Wire repositories, engine, controllers, and the chat router.
///
/// The forwarder and responder are the injected chat capabilities; pass
/// the logging stand-ins when chat is not configured.
pub async fn create_app_state(
	pool: SqlitePool,
	config: ServerConfig,
	forwarder: Arc<dyn Forwarder>,
	responder: Arc<dyn Responder>,
	log_reload: Option<LogReloadHandle>,
) -> AppState {
	let task_repo = Arc::new(TaskRepository::new(pool.clone()));
	let approval_repo = Arc::new(ApprovalRepository::new(pool.clone()));
	let audit_repo = Arc::new(AuditRepository::new(pool.clone()));
	let dead_letter_repo = Arc::new(DeadLetterRepository::new(pool.clone()));
	let job_repo = Arc::new(JobRepository::new(pool.clone()));

	let session_store = Arc::new(
		SessionContextStore::new()
			.with_repository(SessionContextRepository::new(pool.clone())),
	);

	let project_repo = ProjectRepository::new(pool.clone());
	let project_manager = ProjectManager::new(project_repo.clone());

	let engine = TaskEngine::new(EngineConfig {
		queue_capacity: config.engine.queue_capacity,
		workers: config.engine.workers,
		default_timeout: Duration::from_secs(config.engine.task_timeout_secs),
		callback_timeout: Duration::from_secs(config.engine.callback_timeout_secs),
		requeue_pending_on_start: config.engine.requeue_pending_on_start,
		callback: CallbackConfig {
			retries: config.engine.callback_retries,
			retry_delay: Duration::from_millis(config.engine.callback_retry_delay_ms),
			request_timeout: Duration::from_secs(config.engine.callback_timeout_secs.min(10)),
		},
		..EngineConfig::default()
	});
	engine.set_store(task_repo.clone());
	engine.set_notifier(Arc::new(
		ChatCompletionNotifier::new(responder.clone())
			.with_dead_letters(DeadLetterRepository::new(pool.clone())),
	));
	engine.set_approval_sink(Arc::new(ApprovalPrompter::new(
		ApprovalRepository::new(pool.clone()),
		responder.clone(),
	)));

	let mut registry = RegistryExecutor::new();
	registry.register("noop", Arc::new(NoopHandler));
	registry.register(
		"slack.send-message",
		Arc::new(SendMessageHandler::new(responder.clone())),
	);
	engine.set_executor(Arc::new(registry));

	let drive = DriveController::new(project_repo.clone(), forwarder.clone(), responder.clone());

	let router = Arc::new(MessageRouter::new(
		project_repo.clone(),
		project_manager.clone(),
		session_store.clone(),
		engine.clone(),
		ApprovalRepository::new(pool.clone()),
		forwarder,
		responder,
		Arc::new(drive.clone()),
	));

	let metrics = Arc::new(Metrics::new().expect("metrics registry"));
	let runtime = Arc::new(RwLock::new(RuntimeConfig {
		log_level: config.logging.level.clone(),
		rate_limit_rps: config.http.rate_limit_rps,
	}));

	AppState {
		config: Arc::new(config),
		runtime,
		pool,
		engine,
		task_repo,
		approval_repo,
		audit_repo,
		dead_letter_repo,
		session_store,
		project_repo,
		project_manager,
		drive,
		router,
		job_repo,
		scheduler: None,
		metrics,
		rate_limiter: Arc::new(RateLimiter::new()),
		log_reload,
		started_at: Utc::now(),
	}
}

async fn metrics_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
	let method = req.method().to_string();
	let response = next.run(req).await;
	state
		.metrics
		.http_requests
		.with_label_values(&[&method, response.status().as_str()])
		.inc();
	response
}

/// Build the full route tree. Probe endpoints sit outside auth and rate
/// limiting; everything under /api/v1 goes through both.
pub fn create_router(state: AppState) -> Router {
	let api = Router::new()
		.route("/tasks", post(routes::tasks::submit).get(routes::tasks::list))
		.route(
			"/tasks/{id}",
			get(routes::tasks::get_task).delete(routes::tasks::cancel),
		)
		.route("/context", post(routes::context::register))
		.route("/chat", post(routes::chat::send))
		.route("/chat/events", post(routes::chat::event))
		.route("/chat/actions", post(routes::chat::action))
		.route("/approvals", get(routes::approvals::list))
		.route("/approvals/{id}/approve", post(routes::approvals::approve))
		.route("/approvals/{id}/deny", post(routes::approvals::deny))
		.route(
			"/projects",
			post(routes::projects::create).get(routes::projects::list),
		)
		.route(
			"/projects/{slug}",
			get(routes::projects::get_project).delete(routes::projects::delete),
		)
		.route("/projects/{slug}/archive", post(routes::projects::archive))
		.route("/projects/{slug}/resume", post(routes::projects::resume))
		.route("/projects/{slug}/drive", post(routes::projects::drive))
		.route("/projects/{slug}/pause", post(routes::projects::pause))
		.route("/projects/{slug}/phase", post(routes::projects::phase))
		.route(
			"/projects/{slug}/memory",
			post(routes::projects::add_memory).get(routes::projects::list_memory),
		)
		.route("/projects/{slug}/events", get(routes::projects::list_events))
		.route("/projects/{slug}/stats", get(routes::projects::stats))
		.route("/health", get(routes::health::api_health))
		.route(
			"/config",
			get(routes::config::get_config).patch(routes::config::patch_config),
		)
		.route("/metrics/summary", get(routes::health::metrics_summary))
		.layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
		.layer(middleware::from_fn_with_state(
			state.clone(),
			rate_limit_middleware,
		));

	Router::new()
		.route("/healthz", get(routes::health::healthz))
		.route("/readyz", get(routes::health::readyz))
		.route("/metrics", get(routes::health::prometheus_metrics))
		.route(
			"/api-docs/openapi.json",
			get(|| async { axum::Json(<crate::ApiDoc as utoipa::OpenApi>::openapi()) }),
		)
		.nest("/api/v1", api)
		.layer(middleware::from_fn(request_id_middleware))
		.layer(middleware::from_fn_with_state(
			state.clone(),
			metrics_middleware,
		))
		.with_state(state)
}
