// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("config file error: {0}")]
	Io(#[from] std::io::Error),

	#[error("config parse error: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid value for {key}: {message}")]
	Invalid { key: String, message: String },

	#[error("validation failed: {0}")]
	Validation(String),
}

impl ConfigError {
	pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
		ConfigError::Invalid {
			key: key.into(),
			message: message.into(),
		}
	}
}
