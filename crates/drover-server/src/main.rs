// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Drover agent server binary.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_server::chat_bridge::{LoggingForwarder, LoggingResponder};
use drover_server::jobs::{DeadLetterRetryJob, DriveExpiryJob, RetentionJob};
use drover_server::{create_app_state, create_router};
use drover_server_db::SessionContextRepository;
use drover_server_jobs::JobScheduler;
use drover_server::version;

/// Drover server - platform automation agent.
#[derive(Parser, Debug)]
#[command(name = "drover-server", about = "Drover platform automation agent", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/drover/server.toml).
	#[arg(long)]
	config: Option<std::path::PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match args.config {
		Some(path) => drover_server_config::load_config_with_file(path)?,
		None => drover_server_config::load_config()?,
	};

	// Tracing with a reloadable filter so PATCH /api/v1/config can change
	// the level at runtime.
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
	let (filter_layer, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
	tracing_subscriber::registry()
		.with(filter_layer)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting drover-server"
	);

	let pool = drover_server_db::create_pool(&config.database.url).await?;
	drover_server_db::run_migrations(&pool).await?;

	// The real chat bindings are injected by deployment builds; fall back
	// to logging stand-ins when chat is not configured.
	let forwarder = Arc::new(LoggingForwarder);
	let responder = Arc::new(LoggingResponder);

	let retention_config = config.retention.clone();
	let drive_config = config.drive.clone();
	let mut state = create_app_state(
		pool.clone(),
		config,
		forwarder,
		responder.clone(),
		Some(reload_handle),
	)
	.await;

	state.engine.start().await?;

	// Reconstruct auto-drive controllers from the store.
	match state.drive.restore_driving().await {
		Ok(restored) if restored > 0 => tracing::info!(restored, "auto-drive restored"),
		Ok(_) => {}
		Err(e) => tracing::error!(error = %e, "auto-drive restore failed"),
	}

	// Background maintenance jobs.
	let mut scheduler = JobScheduler::new(state.job_repo.clone());
	scheduler.register_periodic(
		Arc::new(RetentionJob::new(
			retention_config.clone(),
			state.task_repo.clone(),
			state.approval_repo.clone(),
			SessionContextRepository::new(pool.clone()),
			state.session_store.clone(),
			state.project_repo.clone(),
			state.dead_letter_repo.clone(),
			state.audit_repo.clone(),
			state.job_repo.clone(),
			state.engine.clone(),
		)),
		Duration::from_secs(retention_config.sweep_interval_secs),
	);
	scheduler.register_periodic(
		Arc::new(DeadLetterRetryJob::new(
			state.dead_letter_repo.clone(),
			responder,
		)),
		Duration::from_secs(60),
	);
	scheduler.register_periodic(
		Arc::new(DriveExpiryJob::new(state.drive.clone())),
		Duration::from_secs(drive_config.expiry_sweep_secs),
	);

	let scheduler = Arc::new(scheduler);
	if let Err(e) = scheduler.start().await {
		tracing::error!(error = %e, "failed to start job scheduler");
	}
	state.scheduler = Some(Arc::clone(&scheduler));

	let cors = if state.config.http.cors_origins.is_empty() {
		CorsLayer::new()
			.allow_origin(Any)
			.allow_methods(Any)
			.allow_headers(Any)
	} else {
		let origins: Vec<axum::http::HeaderValue> = state
			.config
			.http
			.cors_origins
			.iter()
			.filter_map(|o| o.parse().ok())
			.collect();
		CorsLayer::new()
			.allow_origin(tower_http::cors::AllowOrigin::list(origins))
			.allow_methods(Any)
			.allow_headers(Any)
	};

	let app = create_router(state.clone())
		.layer(TraceLayer::new_for_http())
		.layer(cors);

	let addr = state.config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(
			listener,
			app.into_make_service_with_connect_info::<SocketAddr>(),
		) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("received shutdown signal");
		}
	}

	// Shutdown order: engine drains its workers, then the drive loops,
	// then the scheduler, then the pool.
	state.engine.stop().await;
	state.drive.stop_all().await;
	scheduler.shutdown().await;
	state.pool.close().await;

	tracing::info!("server shutdown complete");
	Ok(())
}
