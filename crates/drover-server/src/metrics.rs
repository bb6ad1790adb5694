// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Prometheus metrics for the management surface.

use prometheus::{
	Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
	registry: Registry,
	pub http_requests: IntCounterVec,
	pub tasks_submitted: IntCounterVec,
	pub tasks_completed: IntCounterVec,
	pub queue_depth: IntGauge,
	pub drive_controllers: IntGauge,
}

impl Metrics {
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let http_requests = IntCounterVec::new(
			Opts::new("drover_http_requests_total", "HTTP requests by method and status"),
			&["method", "status"],
		)?;
		let tasks_submitted = IntCounterVec::new(
			Opts::new("drover_tasks_submitted_total", "Tasks accepted by type"),
			&["type"],
		)?;
		let tasks_completed = IntCounterVec::new(
			Opts::new("drover_tasks_terminal_total", "Tasks reaching a terminal state"),
			&["status"],
		)?;
		let queue_depth = IntGauge::new("drover_task_queue_depth", "Tasks waiting in the queue")?;
		let drive_controllers =
			IntGauge::new("drover_drive_controllers", "Running auto-drive controllers")?;

		registry.register(Box::new(http_requests.clone()))?;
		registry.register(Box::new(tasks_submitted.clone()))?;
		registry.register(Box::new(tasks_completed.clone()))?;
		registry.register(Box::new(queue_depth.clone()))?;
		registry.register(Box::new(drive_controllers.clone()))?;

		Ok(Self {
			registry,
			http_requests,
			tasks_submitted,
			tasks_completed,
			queue_depth,
			drive_controllers,
		})
	}

	pub fn gather(&self) -> Result<String, prometheus::Error> {
		let encoder = TextEncoder::new();
		let families = self.registry.gather();
		let mut buffer = Vec::new();
		encoder.encode(&families, &mut buffer)?;
		Ok(String::from_utf8_lossy(&buffer).into_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_gather_includes_counters() {
		let metrics = Metrics::new().unwrap();
		metrics
			.http_requests
			.with_label_values(&["GET", "200"])
			.inc();
		metrics.queue_depth.set(3);

		let text = metrics.gather().unwrap();
		assert!(text.contains("drover_http_requests_total"));
		assert!(text.contains("drover_task_queue_depth 3"));
	}
}
