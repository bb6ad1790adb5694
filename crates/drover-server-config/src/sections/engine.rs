// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Task engine and callback configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfigLayer {
	pub workers: Option<usize>,
	pub queue_capacity: Option<usize>,
	pub task_timeout_secs: Option<u64>,
	pub requeue_pending_on_start: Option<bool>,
	pub callback_timeout_secs: Option<u64>,
	pub callback_retries: Option<u32>,
	pub callback_retry_delay_ms: Option<u64>,
	pub approval_timeout_secs: Option<u64>,
}

impl EngineConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.workers.is_some() {
			self.workers = other.workers;
		}
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
		if other.task_timeout_secs.is_some() {
			self.task_timeout_secs = other.task_timeout_secs;
		}
		if other.requeue_pending_on_start.is_some() {
			self.requeue_pending_on_start = other.requeue_pending_on_start;
		}
		if other.callback_timeout_secs.is_some() {
			self.callback_timeout_secs = other.callback_timeout_secs;
		}
		if other.callback_retries.is_some() {
			self.callback_retries = other.callback_retries;
		}
		if other.callback_retry_delay_ms.is_some() {
			self.callback_retry_delay_ms = other.callback_retry_delay_ms;
		}
		if other.approval_timeout_secs.is_some() {
			self.approval_timeout_secs = other.approval_timeout_secs;
		}
	}

	pub fn finalize(self) -> EngineSectionConfig {
		EngineSectionConfig {
			workers: self.workers.unwrap_or(4),
			queue_capacity: self.queue_capacity.unwrap_or(1000),
			task_timeout_secs: self.task_timeout_secs.unwrap_or(300),
			requeue_pending_on_start: self.requeue_pending_on_start.unwrap_or(false),
			callback_timeout_secs: self.callback_timeout_secs.unwrap_or(30),
			callback_retries: self.callback_retries.unwrap_or(2),
			callback_retry_delay_ms: self.callback_retry_delay_ms.unwrap_or(2000),
			approval_timeout_secs: self.approval_timeout_secs.unwrap_or(3600),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSectionConfig {
	pub workers: usize,
	pub queue_capacity: usize,
	pub task_timeout_secs: u64,
	pub requeue_pending_on_start: bool,
	pub callback_timeout_secs: u64,
	pub callback_retries: u32,
	pub callback_retry_delay_ms: u64,
	pub approval_timeout_secs: u64,
}

impl Default for EngineSectionConfig {
	fn default() -> Self {
		EngineConfigLayer::default().finalize()
	}
}
