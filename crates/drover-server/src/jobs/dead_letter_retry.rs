// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Revives chat messages that failed delivery.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use drover_server_chat::Responder;
use drover_server_db::DeadLetterRepository;
use drover_server_jobs::{Job, JobContext, JobError, JobOutput, Result};

const MAX_RETRIES: i64 = 10;
const BASE_BACKOFF_MINUTES: i64 = 1;
const MAX_BACKOFF_MINUTES: i64 = 60;

pub struct DeadLetterRetryJob {
	dead_letters: Arc<DeadLetterRepository>,
	responder: Arc<dyn Responder>,
}

impl DeadLetterRetryJob {
	pub fn new(dead_letters: Arc<DeadLetterRepository>, responder: Arc<dyn Responder>) -> Self {
		Self {
			dead_letters,
			responder,
		}
	}
}

fn backoff_minutes(retry_count: i64) -> i64 {
	(BASE_BACKOFF_MINUTES << retry_count.clamp(0, 10)).min(MAX_BACKOFF_MINUTES)
}

#[async_trait]
impl Job for DeadLetterRetryJob {
	fn id(&self) -> &str {
		"dead-letter-retry"
	}

	fn name(&self) -> &str {
		"Dead Letter Retry"
	}

	fn description(&self) -> &str {
		"Re-post chat messages that previously failed delivery"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput> {
		let due = self
			.dead_letters
			.due(Utc::now())
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		let mut delivered = 0;
		let mut deferred = 0;
		let mut abandoned = 0;

		for letter in due {
			ctx.check_cancelled()?;

			match self
				.responder
				.post_message(&letter.channel, letter.thread_ts.as_deref(), &letter.payload)
				.await
			{
				Ok(()) => {
					self.dead_letters
						.mark_resolved(&letter.id)
						.await
						.map_err(|e| JobError::retryable(e.to_string()))?;
					delivered += 1;
					info!(dead_letter_id = %letter.id, channel = %letter.channel, "dead letter delivered");
				}
				Err(e) if letter.retry_count + 1 >= MAX_RETRIES => {
					// Out of retries: resolve so retention can reap it.
					warn!(
						dead_letter_id = %letter.id,
						retries = letter.retry_count,
						error = %e,
						"dead letter abandoned"
					);
					self.dead_letters
						.mark_resolved(&letter.id)
						.await
						.map_err(|e| JobError::retryable(e.to_string()))?;
					abandoned += 1;
				}
				Err(e) => {
					let next =
						Utc::now() + Duration::minutes(backoff_minutes(letter.retry_count + 1));
					self.dead_letters
						.bump_retry(&letter.id, &e.to_string(), next)
						.await
						.map_err(|e| JobError::retryable(e.to_string()))?;
					deferred += 1;
				}
			}
		}

		Ok(JobOutput {
			message: format!("{delivered} delivered, {deferred} deferred, {abandoned} abandoned"),
			detail: Some(serde_json::json!({
				"delivered": delivered,
				"deferred": deferred,
				"abandoned": abandoned,
			})),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use drover_server_chat::ChatError;
	use drover_server_db::testing::create_test_pool;
	use tokio::sync::Mutex;

	struct FlippableResponder {
		fail: std::sync::atomic::AtomicBool,
		posts: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl Responder for FlippableResponder {
		async fn post_message(
			&self,
			_channel: &str,
			_thread_ts: Option<&str>,
			text: &str,
		) -> drover_server_chat::Result<()> {
			if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
				return Err(ChatError::Delivery("still down".to_string()));
			}
			self.posts.lock().await.push(text.to_string());
			Ok(())
		}

		async fn post_blocks(
			&self,
			_channel: &str,
			_thread_ts: Option<&str>,
			_fallback: &str,
			_blocks: &[serde_json::Value],
		) -> drover_server_chat::Result<()> {
			Ok(())
		}
	}

	fn ctx() -> JobContext {
		JobContext {
			run_id: "r1".to_string(),
			cancellation_token: Default::default(),
		}
	}

	#[test]
	fn test_backoff_doubles_to_cap() {
		assert_eq!(backoff_minutes(1), 2);
		assert_eq!(backoff_minutes(2), 4);
		assert_eq!(backoff_minutes(6), 60);
	}

	#[tokio::test]
	async fn test_retry_then_deliver() {
		let pool = create_test_pool().await;
		let repo = Arc::new(DeadLetterRepository::new(pool));
		let responder = Arc::new(FlippableResponder {
			fail: std::sync::atomic::AtomicBool::new(true),
			posts: Mutex::new(Vec::new()),
		});
		let job = DeadLetterRetryJob::new(repo.clone(), responder.clone());

		repo.park("C1", None, "hello again", "down", Utc::now())
			.await
			.unwrap();

		// First pass: chat still down, the letter defers.
		let output = job.run(&ctx()).await.unwrap();
		assert_eq!(output.detail.as_ref().unwrap()["deferred"], 1);

		// Second pass once it is due again: chat recovered.
		responder.fail.store(false, std::sync::atomic::Ordering::SeqCst);
		let future = Utc::now() + Duration::hours(2);
		let still_parked = repo.due(future).await.unwrap();
		assert_eq!(still_parked.len(), 1);

		// Make it due now for the test.
		repo.bump_retry(&still_parked[0].id, "down", Utc::now()).await.unwrap();
		let output = job.run(&ctx()).await.unwrap();
		assert_eq!(output.detail.as_ref().unwrap()["delivered"], 1);
		assert_eq!(responder.posts.lock().await.len(), 1);
		assert!(repo.due(future).await.unwrap().is_empty());
	}
}
