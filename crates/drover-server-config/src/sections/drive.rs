// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Auto-drive configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DriveConfigLayer {
	pub default_interval_ms: Option<i64>,
	pub expiry_sweep_secs: Option<u64>,
}

impl DriveConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_interval_ms.is_some() {
			self.default_interval_ms = other.default_interval_ms;
		}
		if other.expiry_sweep_secs.is_some() {
			self.expiry_sweep_secs = other.expiry_sweep_secs;
		}
	}

	pub fn finalize(self) -> DriveConfig {
		DriveConfig {
			default_interval_ms: self.default_interval_ms.unwrap_or(600_000),
			expiry_sweep_secs: self.expiry_sweep_secs.unwrap_or(60),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriveConfig {
	pub default_interval_ms: i64,
	pub expiry_sweep_secs: u64,
}

impl Default for DriveConfig {
	fn default() -> Self {
		DriveConfigLayer::default().finalize()
	}
}
