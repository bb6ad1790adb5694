// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Fallback chat bindings.
//!
//! The real conversational worker and chat SDK are injected by deployment
//! builds. When chat is not configured these stand-ins log the traffic so
//! the rest of the system keeps functioning.

use async_trait::async_trait;
use tracing::info;

use drover_server_chat::{Forwarder, Responder, Result};

pub struct LoggingForwarder;

#[async_trait]
impl Forwarder for LoggingForwarder {
	async fn handle_message(
		&self,
		channel: &str,
		user: &str,
		text: &str,
		_thread_ts: Option<&str>,
		_message_ts: &str,
	) -> Result<()> {
		info!(channel, user, text_len = text.len(), "forwarder (logging): message");
		Ok(())
	}

	async fn handle_message_with_session(
		&self,
		channel: &str,
		user: &str,
		text: &str,
		_thread_ts: Option<&str>,
		_message_ts: &str,
		session_key: &str,
	) -> Result<()> {
		info!(
			channel,
			user,
			session_key,
			text_len = text.len(),
			"forwarder (logging): session message"
		);
		Ok(())
	}

	async fn is_active_thread(&self, _channel: &str, _thread_ts: &str) -> bool {
		false
	}
}

pub struct LoggingResponder;

#[async_trait]
impl Responder for LoggingResponder {
	async fn post_message(&self, channel: &str, thread_ts: Option<&str>, text: &str) -> Result<()> {
		info!(channel, ?thread_ts, text, "responder (logging): message");
		Ok(())
	}

	async fn post_blocks(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		fallback: &str,
		blocks: &[serde_json::Value],
	) -> Result<()> {
		info!(
			channel,
			?thread_ts,
			fallback,
			block_count = blocks.len(),
			"responder (logging): blocks"
		);
		Ok(())
	}
}
