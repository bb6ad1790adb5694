// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration credentials (chat, forge, issue tracker).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntegrationsConfigLayer {
	pub slack_bot_token: Option<String>,
	pub slack_app_token: Option<String>,
	pub forge_app_id: Option<String>,
	pub forge_key_path: Option<String>,
	pub tracker_token: Option<String>,
}

impl IntegrationsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.slack_bot_token.is_some() {
			self.slack_bot_token = other.slack_bot_token;
		}
		if other.slack_app_token.is_some() {
			self.slack_app_token = other.slack_app_token;
		}
		if other.forge_app_id.is_some() {
			self.forge_app_id = other.forge_app_id;
		}
		if other.forge_key_path.is_some() {
			self.forge_key_path = other.forge_key_path;
		}
		if other.tracker_token.is_some() {
			self.tracker_token = other.tracker_token;
		}
	}

	pub fn finalize(self) -> IntegrationsConfig {
		IntegrationsConfig {
			slack_bot_token: self.slack_bot_token.unwrap_or_default(),
			slack_app_token: self.slack_app_token.unwrap_or_default(),
			forge_app_id: self.forge_app_id.unwrap_or_default(),
			forge_key_path: self.forge_key_path.unwrap_or_default(),
			tracker_token: self.tracker_token.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationsConfig {
	pub slack_bot_token: String,
	pub slack_app_token: String,
	pub forge_app_id: String,
	pub forge_key_path: String,
	pub tracker_token: String,
}

impl IntegrationsConfig {
	pub fn chat_configured(&self) -> bool {
		!self.slack_bot_token.is_empty()
	}

	pub fn forge_configured(&self) -> bool {
		!self.forge_app_id.is_empty() && !self.forge_key_path.is_empty()
	}
}

impl Default for IntegrationsConfig {
	fn default() -> Self {
		IntegrationsConfigLayer::default().finalize()
	}
}
