// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{JobError, Result};

/// A registered background job.
#[async_trait]
pub trait Job: Send + Sync {
	fn id(&self) -> &str;
	fn name(&self) -> &str;
	fn description(&self) -> &str;

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput>;
}

pub struct JobContext {
	pub run_id: String,
	pub cancellation_token: CancellationToken,
}

impl JobContext {
	/// Bail out between work items when a cancel was requested.
	pub fn check_cancelled(&self) -> Result<()> {
		if self.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
	pub message: String,
	pub detail: Option<serde_json::Value>,
}

#[derive(Clone, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}
