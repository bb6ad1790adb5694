// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The narrow capability seams between the router, the external
//! conversational worker, and the chat surface. All three are injected at
//! wiring time; the core owns none of them.

use async_trait::async_trait;

use drover_server_projects::Project;

use crate::error::Result;

/// Sends a message into the external conversational worker, optionally
/// scoped to a session key.
#[async_trait]
pub trait Forwarder: Send + Sync {
	async fn handle_message(
		&self,
		channel: &str,
		user: &str,
		text: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
	) -> Result<()>;

	#[allow(clippy::too_many_arguments)]
	async fn handle_message_with_session(
		&self,
		channel: &str,
		user: &str,
		text: &str,
		thread_ts: Option<&str>,
		message_ts: &str,
		session_key: &str,
	) -> Result<()>;

	async fn is_active_thread(&self, channel: &str, thread_ts: &str) -> bool;
}

/// Posts into the chat surface.
#[async_trait]
pub trait Responder: Send + Sync {
	async fn post_message(&self, channel: &str, thread_ts: Option<&str>, text: &str) -> Result<()>;

	async fn post_blocks(
		&self,
		channel: &str,
		thread_ts: Option<&str>,
		fallback: &str,
		blocks: &[serde_json::Value],
	) -> Result<()>;
}

/// The auto-drive controller as seen from the router.
#[async_trait]
pub trait DriveControl: Send + Sync {
	async fn start_driving(&self, project: &Project) -> Result<()>;

	/// Returns true if a controller was running.
	async fn stop_driving(&self, project_id: &str) -> bool;

	async fn is_driving(&self, project_id: &str) -> bool;
}
