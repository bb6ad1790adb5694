// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources, merged lowest precedence first.

use std::path::PathBuf;
use tracing::debug;

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuthConfigLayer, DatabaseConfigLayer, DriveConfigLayer, EngineConfigLayer, HttpConfigLayer,
	IntegrationsConfigLayer, LoggingConfigLayer, RetentionConfigLayer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 0,
	File = 1,
	Env = 2,
}

pub trait ConfigSource {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults: an empty layer; every section finalizes to its
/// default.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

/// TOML config file; a missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/drover/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml"
	}

	fn precedence(&self) -> Precedence {
		Precedence::File
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file absent; skipping");
			return Ok(ServerConfigLayer::default());
		}
		let raw = std::fs::read_to_string(&self.path)?;
		Ok(toml::from_str(&raw)?)
	}
}

/// `DROVER_SERVER_*` environment variables.
pub struct EnvSource;

fn env_string(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
	match env_string(key) {
		None => Ok(None),
		Some(raw) => raw
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::invalid(key, format!("cannot parse '{raw}'"))),
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"env"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Env
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		let http = HttpConfigLayer {
			host: env_string("DROVER_SERVER_HOST"),
			port: env_parsed("DROVER_SERVER_PORT")?,
			tls_cert_path: env_string("DROVER_SERVER_TLS_CERT_PATH"),
			tls_key_path: env_string("DROVER_SERVER_TLS_KEY_PATH"),
			cors_origins: env_string("DROVER_SERVER_CORS_ORIGINS")
				.map(|v| v.split(',').map(|s| s.trim().to_string()).collect()),
			rate_limit_rps: env_parsed("DROVER_SERVER_RATE_LIMIT_RPS")?,
			rate_limit_burst: env_parsed("DROVER_SERVER_RATE_LIMIT_BURST")?,
		};

		let auth = AuthConfigLayer {
			mode: env_string("DROVER_SERVER_AUTH_MODE"),
			readonly_key: env_string("DROVER_SERVER_AUTH_READONLY_KEY"),
			operator_key: env_string("DROVER_SERVER_AUTH_OPERATOR_KEY"),
			admin_key: env_string("DROVER_SERVER_AUTH_ADMIN_KEY"),
		};

		let database = DatabaseConfigLayer {
			url: env_string("DROVER_SERVER_DATABASE_URL"),
		};

		let engine = EngineConfigLayer {
			workers: env_parsed("DROVER_SERVER_WORKERS")?,
			queue_capacity: env_parsed("DROVER_SERVER_QUEUE_CAPACITY")?,
			task_timeout_secs: env_parsed("DROVER_SERVER_TASK_TIMEOUT_SECS")?,
			requeue_pending_on_start: env_parsed("DROVER_SERVER_REQUEUE_PENDING")?,
			callback_timeout_secs: env_parsed("DROVER_SERVER_CALLBACK_TIMEOUT_SECS")?,
			callback_retries: env_parsed("DROVER_SERVER_CALLBACK_RETRIES")?,
			callback_retry_delay_ms: env_parsed("DROVER_SERVER_CALLBACK_RETRY_DELAY_MS")?,
			approval_timeout_secs: env_parsed("DROVER_SERVER_APPROVAL_TIMEOUT_SECS")?,
		};

		let drive = DriveConfigLayer {
			default_interval_ms: env_parsed("DROVER_SERVER_DRIVE_DEFAULT_INTERVAL_MS")?,
			expiry_sweep_secs: env_parsed("DROVER_SERVER_DRIVE_EXPIRY_SWEEP_SECS")?,
		};

		let retention = RetentionConfigLayer {
			sweep_interval_secs: env_parsed("DROVER_SERVER_RETENTION_SWEEP_INTERVAL_SECS")?,
			completed_task_days: env_parsed("DROVER_SERVER_RETENTION_TASK_DAYS")?,
			approval_hours: env_parsed("DROVER_SERVER_RETENTION_APPROVAL_HOURS")?,
			session_context_hours: env_parsed("DROVER_SERVER_RETENTION_SESSION_HOURS")?,
			thread_days: env_parsed("DROVER_SERVER_RETENTION_THREAD_DAYS")?,
			dead_letter_hours: env_parsed("DROVER_SERVER_RETENTION_DEAD_LETTER_HOURS")?,
			audit_days: env_parsed("DROVER_SERVER_RETENTION_AUDIT_DAYS")?,
		};

		let logging = LoggingConfigLayer {
			level: env_string("DROVER_SERVER_LOG_LEVEL"),
		};

		let integrations = IntegrationsConfigLayer {
			slack_bot_token: env_string("DROVER_SERVER_SLACK_BOT_TOKEN"),
			slack_app_token: env_string("DROVER_SERVER_SLACK_APP_TOKEN"),
			forge_app_id: env_string("DROVER_SERVER_FORGE_APP_ID"),
			forge_key_path: env_string("DROVER_SERVER_FORGE_KEY_PATH"),
			tracker_token: env_string("DROVER_SERVER_TRACKER_TOKEN"),
		};

		Ok(ServerConfigLayer {
			http: Some(http),
			auth: Some(auth),
			database: Some(database),
			engine: Some(engine),
			drive: Some(drive),
			retention: Some(retention),
			logging: Some(logging),
			integrations: Some(integrations),
		})
	}
}
