// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
	Active,
	Paused,
	Archived,
}

impl ProjectStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ProjectStatus::Active => "active",
			ProjectStatus::Paused => "paused",
			ProjectStatus::Archived => "archived",
		}
	}
}

impl std::str::FromStr for ProjectStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"active" => Ok(ProjectStatus::Active),
			"paused" => Ok(ProjectStatus::Paused),
			"archived" => Ok(ProjectStatus::Archived),
			_ => Err(format!("unknown project status: {s}")),
		}
	}
}

impl std::fmt::Display for ProjectStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A durable conversational workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
	pub id: String,
	pub slug: String,
	pub name: String,
	pub description: String,
	pub repo_url: String,
	pub status: ProjectStatus,
	pub owner: String,
	pub active_session: String,
	pub session_version: i64,
	pub auto_drive: bool,
	pub drive_interval_ms: i64,
	pub report_interval_ms: i64,
	pub report_channel: String,
	pub report_thread: String,
	pub current_phase: String,
	/// Comma-joined ordered phase names.
	pub phases: String,
	pub auto_drive_until: Option<DateTime<Utc>>,
	pub phase_models: HashMap<String, String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub archived_at: Option<DateTime<Utc>>,
}

impl Project {
	pub fn phase_list(&self) -> Vec<&str> {
		self.phases
			.split(',')
			.map(str::trim)
			.filter(|p| !p.is_empty())
			.collect()
	}

	/// Model hint for the current phase, if one was declared.
	pub fn current_phase_model(&self) -> Option<&str> {
		if self.current_phase.is_empty() {
			return None;
		}
		self.phase_models.get(&self.current_phase).map(String::as_str)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
	Decision,
	Blocker,
	Summary,
	ContextCarry,
}

impl MemoryKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			MemoryKind::Decision => "decision",
			MemoryKind::Blocker => "blocker",
			MemoryKind::Summary => "summary",
			MemoryKind::ContextCarry => "context_carry",
		}
	}
}

impl std::str::FromStr for MemoryKind {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"decision" => Ok(MemoryKind::Decision),
			"blocker" => Ok(MemoryKind::Blocker),
			"summary" => Ok(MemoryKind::Summary),
			"context_carry" => Ok(MemoryKind::ContextCarry),
			_ => Err(format!("unknown memory kind: {s}")),
		}
	}
}

/// Append-only project memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
	pub id: String,
	pub project_id: String,
	pub kind: MemoryKind,
	pub content: String,
	pub session_key: Option<String>,
	pub created_at: DateTime<Utc>,
}

/// Append-only audit trail of project activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEvent {
	pub id: String,
	pub project_id: String,
	pub event_type: String,
	pub actor: String,
	pub summary: String,
	pub metadata: Option<serde_json::Value>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProjectStats {
	pub decisions: i64,
	pub blockers: i64,
	pub summaries: i64,
	pub events: i64,
	pub tasks: i64,
}

/// A (channel, thread) persistently routed to a project session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadBinding {
	pub channel: String,
	pub thread_ts: String,
	pub session_key: String,
	pub project_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub last_message_at: DateTime<Utc>,
}

/// The auto-drive knobs persisted in one write.
#[derive(Debug, Clone, Default)]
pub struct AutoDriveSettings {
	pub enabled: bool,
	pub drive_interval_ms: i64,
	pub report_interval_ms: i64,
	pub phases: String,
	pub current_phase: String,
	pub auto_drive_until: Option<DateTime<Utc>>,
	pub report_channel: String,
	pub report_thread: String,
	pub phase_models: HashMap<String, String>,
}
