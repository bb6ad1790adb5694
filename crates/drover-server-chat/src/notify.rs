// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bridge from terminal task state to a chat post.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use drover_server_db::DeadLetterRepository;
use drover_server_engine::{CompletionNotifier, TaskStatus};

use crate::traits::Responder;

const DEAD_LETTER_FIRST_RETRY_SECS: i64 = 60;

/// Posts a completion summary into the task's declared response channel.
/// A failed post is parked as a dead letter for the retry worker.
pub struct ChatCompletionNotifier {
	responder: Arc<dyn Responder>,
	dead_letters: Option<DeadLetterRepository>,
}

impl ChatCompletionNotifier {
	pub fn new(responder: Arc<dyn Responder>) -> Self {
		Self {
			responder,
			dead_letters: None,
		}
	}

	pub fn with_dead_letters(mut self, repo: DeadLetterRepository) -> Self {
		self.dead_letters = Some(repo);
		self
	}

	fn compose(
		task_id: &str,
		task_type: &str,
		status: TaskStatus,
		result: Option<&serde_json::Value>,
		error: Option<&str>,
	) -> String {
		match status {
			TaskStatus::Completed => {
				let mut text = format!(":white_check_mark: Task `{task_id}` ({task_type}) completed.");
				if let Some(result) = result {
					let rendered = serde_json::to_string_pretty(result)
						.unwrap_or_else(|_| result.to_string());
					text.push_str(&format!("\n```{rendered}```"));
				}
				text
			}
			TaskStatus::Failed => format!(
				":x: Task `{task_id}` ({task_type}) failed: {}",
				error.unwrap_or("unknown error")
			),
			other => format!(":hourglass: Task `{task_id}` ({task_type}) is {other}."),
		}
	}
}

#[async_trait]
impl CompletionNotifier for ChatCompletionNotifier {
	async fn notify_task_completion(
		&self,
		channel: &str,
		thread: Option<&str>,
		task_id: &str,
		task_type: &str,
		status: TaskStatus,
		result: Option<&serde_json::Value>,
		error: Option<&str>,
	) {
		let text = Self::compose(task_id, task_type, status, result, error);

		if let Err(e) = self.responder.post_message(channel, thread, &text).await {
			warn!(channel, task_id, error = %e, "completion notification failed");
			if let Some(ref dead_letters) = self.dead_letters {
				let next_retry =
					Utc::now() + chrono::Duration::seconds(DEAD_LETTER_FIRST_RETRY_SECS);
				if let Err(park_err) = dead_letters
					.park(channel, thread, &text, &e.to_string(), next_retry)
					.await
				{
					warn!(channel, task_id, error = %park_err, "dead letter parking failed");
				}
			}
		}
	}
}
