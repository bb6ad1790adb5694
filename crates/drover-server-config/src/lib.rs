// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Drover server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`DROVER_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use drover_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}:{}", config.http.host, config.http.port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub auth: AuthConfig,
	pub database: DatabaseConfig,
	pub engine: EngineSectionConfig,
	pub drive: DriveConfig,
	pub retention: RetentionConfig,
	pub logging: LoggingConfig,
	pub integrations: IntegrationsConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`DROVER_SERVER_*`)
/// 2. Config file (`/etc/drover/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple
/// deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let auth = layer.auth.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let engine = layer.engine.unwrap_or_default().finalize();
	let drive = layer.drive.unwrap_or_default().finalize();
	let retention = layer.retention.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let integrations = layer.integrations.unwrap_or_default().finalize();

	validate(&http, &auth, &engine)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		auth_mode = %auth.mode,
		workers = engine.workers,
		chat_configured = integrations.chat_configured(),
		forge_configured = integrations.forge_configured(),
		"server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		auth,
		database,
		engine,
		drive,
		retention,
		logging,
		integrations,
	})
}

/// Cross-field configuration rules.
fn validate(
	http: &HttpConfig,
	auth: &AuthConfig,
	engine: &EngineSectionConfig,
) -> Result<(), ConfigError> {
	if !auth.disabled()
		&& auth.readonly_key.is_empty()
		&& auth.operator_key.is_empty()
		&& auth.admin_key.is_empty()
	{
		return Err(ConfigError::Validation(
			"auth mode is 'token' but no DROVER_SERVER_AUTH_*_KEY is set. \
			 Set at least one role key, or set DROVER_SERVER_AUTH_MODE=none for \
			 unauthenticated operation."
				.to_string(),
		));
	}

	if http.tls_cert_path.is_some() != http.tls_key_path.is_some() {
		return Err(ConfigError::Validation(
			"TLS requires both a certificate and a key path".to_string(),
		));
	}

	if engine.workers == 0 || engine.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"engine workers and queue capacity must be positive".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn token_auth() -> AuthConfig {
		AuthConfig {
			mode: "token".to_string(),
			readonly_key: String::new(),
			operator_key: "op-key".to_string(),
			admin_key: String::new(),
		}
	}

	#[test]
	fn test_validate_accepts_defaults_with_key() {
		validate(
			&HttpConfig::default(),
			&token_auth(),
			&EngineSectionConfig::default(),
		)
		.unwrap();
	}

	#[test]
	fn test_validate_rejects_keyless_token_mode() {
		let err = validate(
			&HttpConfig::default(),
			&AuthConfig::default(),
			&EngineSectionConfig::default(),
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_validate_rejects_half_tls() {
		let http = HttpConfig {
			tls_cert_path: Some("/tmp/cert.pem".to_string()),
			..Default::default()
		};
		let err = validate(&http, &token_auth(), &EngineSectionConfig::default()).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_file_layer_overrides_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(
			&path,
			"[http]\nport = 9090\n\n[auth]\nmode = \"none\"\n",
		)
		.unwrap();

		let config = load_config_with_file(&path).unwrap();
		assert_eq!(config.http.port, 9090);
		assert!(config.auth.disabled());
		assert_eq!(config.socket_addr(), "0.0.0.0:9090");
	}
}
