// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retention windows for the periodic sweep.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfigLayer {
	pub sweep_interval_secs: Option<u64>,
	pub completed_task_days: Option<i64>,
	pub approval_hours: Option<i64>,
	pub session_context_hours: Option<i64>,
	pub thread_days: Option<i64>,
	pub dead_letter_hours: Option<i64>,
	pub audit_days: Option<i64>,
}

impl RetentionConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.sweep_interval_secs.is_some() {
			self.sweep_interval_secs = other.sweep_interval_secs;
		}
		if other.completed_task_days.is_some() {
			self.completed_task_days = other.completed_task_days;
		}
		if other.approval_hours.is_some() {
			self.approval_hours = other.approval_hours;
		}
		if other.session_context_hours.is_some() {
			self.session_context_hours = other.session_context_hours;
		}
		if other.thread_days.is_some() {
			self.thread_days = other.thread_days;
		}
		if other.dead_letter_hours.is_some() {
			self.dead_letter_hours = other.dead_letter_hours;
		}
		if other.audit_days.is_some() {
			self.audit_days = other.audit_days;
		}
	}

	pub fn finalize(self) -> RetentionConfig {
		RetentionConfig {
			sweep_interval_secs: self.sweep_interval_secs.unwrap_or(3600),
			completed_task_days: self.completed_task_days.unwrap_or(7),
			approval_hours: self.approval_hours.unwrap_or(1),
			session_context_hours: self.session_context_hours.unwrap_or(24),
			thread_days: self.thread_days.unwrap_or(7),
			dead_letter_hours: self.dead_letter_hours.unwrap_or(24),
			audit_days: self.audit_days.unwrap_or(30),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfig {
	pub sweep_interval_secs: u64,
	pub completed_task_days: i64,
	pub approval_hours: i64,
	pub session_context_hours: i64,
	pub thread_days: i64,
	pub dead_letter_hours: i64,
	pub audit_days: i64,
}

impl Default for RetentionConfig {
	fn default() -> Self {
		RetentionConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_windows() {
		let config = RetentionConfig::default();
		assert_eq!(config.completed_task_days, 7);
		assert_eq!(config.approval_hours, 1);
		assert_eq!(config.session_context_hours, 24);
		assert_eq!(config.thread_days, 7);
		assert_eq!(config.dead_letter_hours, 24);
		assert_eq!(config.audit_days, 30);
	}
}
