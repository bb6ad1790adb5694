// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Auth configuration section.
//!
//! Bearer keys map to role levels readonly < operator < admin; mode
//! "none" disables authentication entirely (probe endpoints always
//! bypass).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfigLayer {
	pub mode: Option<String>,
	pub readonly_key: Option<String>,
	pub operator_key: Option<String>,
	pub admin_key: Option<String>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.mode.is_some() {
			self.mode = other.mode;
		}
		if other.readonly_key.is_some() {
			self.readonly_key = other.readonly_key;
		}
		if other.operator_key.is_some() {
			self.operator_key = other.operator_key;
		}
		if other.admin_key.is_some() {
			self.admin_key = other.admin_key;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		AuthConfig {
			mode: self.mode.unwrap_or_else(|| "token".to_string()),
			readonly_key: self.readonly_key.unwrap_or_default(),
			operator_key: self.operator_key.unwrap_or_default(),
			admin_key: self.admin_key.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
	pub mode: String,
	pub readonly_key: String,
	pub operator_key: String,
	pub admin_key: String,
}

impl AuthConfig {
	pub fn disabled(&self) -> bool {
		self.mode == "none"
	}
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_token_mode() {
		let config = AuthConfig::default();
		assert_eq!(config.mode, "token");
		assert!(!config.disabled());
	}

	#[test]
	fn test_none_mode_disables() {
		let config = AuthConfigLayer {
			mode: Some("none".to_string()),
			..Default::default()
		}
		.finalize();
		assert!(config.disabled());
	}
}
