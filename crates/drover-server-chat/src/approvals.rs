// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Records pending approvals and prompts the approvers in chat.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use drover_server_db::{ApprovalRepository, PendingApproval};
use drover_server_engine::{ApprovalSink, TaskSnapshot};

use crate::blocks;
use crate::traits::Responder;

pub struct ApprovalPrompter {
	approvals: ApprovalRepository,
	responder: Arc<dyn Responder>,
}

impl ApprovalPrompter {
	pub fn new(approvals: ApprovalRepository, responder: Arc<dyn Responder>) -> Self {
		Self {
			approvals,
			responder,
		}
	}
}

/// `deploy production-cluster` → ("deploy", "production-cluster").
fn split_reason(reason: &str) -> (String, String) {
	match reason.split_once(char::is_whitespace) {
		Some((action, resource)) => (action.to_string(), resource.trim().to_string()),
		None => (reason.to_string(), String::new()),
	}
}

#[async_trait]
impl ApprovalSink for ApprovalPrompter {
	async fn record_awaiting_approval(&self, task: &TaskSnapshot, reason: &str) {
		let request_id = Uuid::new_v4().to_string();
		let (action, resource) = split_reason(reason);

		let approval = PendingApproval {
			id: request_id.clone(),
			task_id: task.id.clone(),
			caller_id: task.caller_id.clone(),
			permission: reason.to_string(),
			action,
			resource,
			channel: task.response_channel.clone(),
			thread_ts: task.response_thread.clone(),
			created_at: Utc::now(),
		};

		if let Err(e) = self.approvals.insert(&approval).await {
			warn!(task_id = %task.id, error = %e, "pending approval could not be recorded");
			return;
		}

		let Some(channel) = approval.channel.as_deref().filter(|c| !c.is_empty()) else {
			return;
		};

		let fallback = format!("Approval required for task {}: {reason}", task.id);
		let prompt = vec![
			blocks::section(&format!(
				":lock: Task `{}` ({}) needs approval:\n> {}",
				task.id, task.task_type, reason
			)),
			blocks::actions(vec![
				blocks::styled_button(&format!("approve_{request_id}"), "Approve", "primary"),
				blocks::styled_button(&format!("deny_{request_id}"), "Deny", "danger"),
			]),
		];

		if let Err(e) = self
			.responder
			.post_blocks(channel, approval.thread_ts.as_deref(), &fallback, &prompt)
			.await
		{
			warn!(channel, task_id = %task.id, error = %e, "approval prompt post failed");
		}
	}
}
