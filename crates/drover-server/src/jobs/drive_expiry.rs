// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Periodic auto-drive expiry sweep. The drive loop checks expiry inline
//! on every tick; this job catches controllers wedged on a slow forwarder
//! and posts the expiry notice.

use async_trait::async_trait;

use drover_server_drive::DriveController;
use drover_server_jobs::{Job, JobContext, JobError, JobOutput, Result};

pub struct DriveExpiryJob {
	drive: DriveController,
}

impl DriveExpiryJob {
	pub fn new(drive: DriveController) -> Self {
		Self { drive }
	}
}

#[async_trait]
impl Job for DriveExpiryJob {
	fn id(&self) -> &str {
		"drive-expiry"
	}

	fn name(&self) -> &str {
		"Auto-Drive Expiry"
	}

	fn description(&self) -> &str {
		"Stop auto-drive controllers whose window has ended"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput> {
		ctx.check_cancelled()?;

		let swept = self
			.drive
			.sweep_expired()
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		Ok(JobOutput {
			message: format!("{swept} expired controllers stopped"),
			detail: Some(serde_json::json!({"swept": swept})),
		})
	}
}
