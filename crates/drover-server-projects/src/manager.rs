// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session key canon, context preamble assembly, rotation and resume.

use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use crate::error::{ProjectError, Result};
use crate::repository::ProjectRepository;
use crate::types::{MemoryKind, Project, ProjectStatus};

static SESSION_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^agent:main:project-([a-z0-9-]+?)(?:-v(\d+))?$").expect("session key regex")
});

/// Canonical session key for a project at a given version.
///
/// Version 1 carries no suffix: `agent:main:project-<slug>`; later versions
/// append `-v<N>`.
pub fn session_key(slug: &str, version: i64) -> String {
	if version <= 1 {
		format!("agent:main:project-{slug}")
	} else {
		format!("agent:main:project-{slug}-v{version}")
	}
}

/// Extract (slug, version) from a session key.
pub fn parse_session_key(key: &str) -> Option<(String, i64)> {
	let captures = SESSION_KEY_REGEX.captures(key)?;
	let slug = captures.get(1)?.as_str().to_string();
	let version = captures
		.get(2)
		.and_then(|v| v.as_str().parse().ok())
		.unwrap_or(1);
	Some((slug, version))
}

/// Orchestrates project session lifecycle on top of the repository.
#[derive(Clone)]
pub struct ProjectManager {
	repo: ProjectRepository,
}

impl ProjectManager {
	pub fn new(repo: ProjectRepository) -> Self {
		Self { repo }
	}

	pub fn repository(&self) -> &ProjectRepository {
		&self.repo
	}

	/// The session key new conversation turns should target. Touches the
	/// project so idle sweeps see the activity.
	pub async fn create_session(&self, slug: &str) -> Result<String> {
		let project = self
			.repo
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;
		self.repo.touch_project(slug).await?;
		Ok(project.active_session)
	}

	/// The multi-section text block seeding the external worker's session:
	/// project header, decisions, blockers, recent carried context, and a
	/// compact index of the other active projects.
	pub async fn build_context_preamble(&self, project: &Project) -> Result<String> {
		let mut out = String::new();

		out.push_str(&format!(
			"Project: {} (`{}`)\nRepository: {}\nSession: v{}\nCreated: {}\n",
			project.name,
			project.slug,
			if project.repo_url.is_empty() {
				"(none)"
			} else {
				&project.repo_url
			},
			project.session_version,
			project.created_at.format("%Y-%m-%d"),
		));
		if !project.description.is_empty() {
			out.push_str(&format!("Description: {}\n", project.description));
		}

		let decisions = self
			.repo
			.list_memory(&project.id, Some(MemoryKind::Decision))
			.await?;
		if !decisions.is_empty() {
			out.push_str("\nDecisions so far:\n");
			for (i, entry) in decisions.iter().enumerate() {
				out.push_str(&format!("{}. {}\n", i + 1, entry.content));
			}
		}

		let blockers = self
			.repo
			.list_memory(&project.id, Some(MemoryKind::Blocker))
			.await?;
		if !blockers.is_empty() {
			out.push_str("\nOpen blockers:\n");
			for (i, entry) in blockers.iter().enumerate() {
				out.push_str(&format!("{}. {}\n", i + 1, entry.content));
			}
		}

		let carries = self
			.repo
			.list_memory(&project.id, Some(MemoryKind::ContextCarry))
			.await?;
		if !carries.is_empty() {
			out.push_str("\nCarried context from previous sessions:\n");
			for entry in carries.iter().rev().take(3) {
				out.push_str(&format!("- {}\n", entry.content));
			}
		}

		let index = self.build_project_index(Some(&project.slug)).await?;
		if !index.is_empty() {
			out.push_str("\nOther active projects:\n");
			out.push_str(&index);
		}

		Ok(out)
	}

	/// One line per active project: slug, truncated description, decision
	/// and task counts.
	pub async fn build_project_index(&self, exclude_slug: Option<&str>) -> Result<String> {
		let projects = self
			.repo
			.list_projects(Some(ProjectStatus::Active), None)
			.await?;

		let mut out = String::new();
		for project in projects {
			if exclude_slug == Some(project.slug.as_str()) {
				continue;
			}
			let stats = self.repo.get_project_stats(&project.id).await?;
			let mut description = project.description.clone();
			if description.chars().count() > 60 {
				description = description.chars().take(57).collect();
				description.push_str("...");
			}
			out.push_str(&format!(
				"- {}: {} ({} decisions, {} tasks)\n",
				project.slug,
				if description.is_empty() {
					"(no description)"
				} else {
					&description
				},
				stats.decisions,
				stats.tasks,
			));
		}
		Ok(out)
	}

	/// Retire the current session key and mint its successor, carrying a
	/// short summary forward as memory tagged with the previous key.
	pub async fn rotate_session(&self, slug: &str, carry: &str, actor: &str) -> Result<Project> {
		let mut project = self
			.repo
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;

		let previous_key = project.active_session.clone();
		let new_version = project.session_version + 1;
		let new_key = session_key(slug, new_version);

		if !carry.is_empty() {
			self.repo
				.add_memory(
					&project.id,
					MemoryKind::ContextCarry,
					carry,
					Some(&previous_key),
				)
				.await?;
		}

		self.repo
			.update_active_session(slug, &new_key, new_version)
			.await?;
		self.repo
			.add_event(
				&project.id,
				"session_rotated",
				actor,
				&format!("Session rotated to v{new_version}"),
				Some(serde_json::json!({
					"previous_session": previous_key,
					"new_session": new_key,
				})),
			)
			.await?;

		info!(slug, version = new_version, "session rotated");
		project.active_session = new_key;
		project.session_version = new_version;
		Ok(project)
	}

	/// Archived → active, with a fresh session key (version bump, no carry).
	pub async fn resume_project(&self, slug: &str, actor: &str) -> Result<Project> {
		let mut project = self
			.repo
			.get_project(slug)
			.await?
			.ok_or_else(|| ProjectError::NotFound(slug.to_string()))?;

		if project.status != ProjectStatus::Archived {
			return Err(ProjectError::NotArchived(slug.to_string()));
		}

		project.status = ProjectStatus::Active;
		project.archived_at = None;
		self.repo.update_project(&project).await?;

		let resumed = self.rotate_session(slug, "", actor).await?;
		self.repo
			.add_event(
				&project.id,
				"project_resumed",
				actor,
				&format!("Project resumed at session v{}", resumed.session_version),
				None,
			)
			.await?;

		Ok(resumed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use drover_server_db::testing::create_test_pool;

	async fn manager() -> ProjectManager {
		ProjectManager::new(ProjectRepository::new(create_test_pool().await))
	}

	#[test]
	fn test_session_key_format() {
		assert_eq!(session_key("alpha", 1), "agent:main:project-alpha");
		assert_eq!(session_key("alpha", 2), "agent:main:project-alpha-v2");
		assert_eq!(session_key("alpha", 13), "agent:main:project-alpha-v13");
	}

	#[test]
	fn test_parse_session_key() {
		assert_eq!(
			parse_session_key("agent:main:project-alpha"),
			Some(("alpha".to_string(), 1))
		);
		assert_eq!(
			parse_session_key("agent:main:project-alpha-v3"),
			Some(("alpha".to_string(), 3))
		);
		assert_eq!(
			parse_session_key("agent:main:project-big-thing-v2"),
			Some(("big-thing".to_string(), 2))
		);
		assert_eq!(parse_session_key("agent:other:project-alpha"), None);
	}

	#[tokio::test]
	async fn test_rotate_session_increments_and_carries() {
		let manager = manager().await;
		let project = manager
			.repo
			.create_project("Alpha", "", "", "")
			.await
			.unwrap();
		assert_eq!(project.active_session, "agent:main:project-alpha");

		let rotated = manager
			.rotate_session("alpha", "we picked sqlite", "alice")
			.await
			.unwrap();
		assert_eq!(rotated.session_version, 2);
		assert_eq!(rotated.active_session, "agent:main:project-alpha-v2");

		// Carry is tagged with the *previous* session key.
		let carries = manager
			.repo
			.list_memory(&project.id, Some(MemoryKind::ContextCarry))
			.await
			.unwrap();
		assert_eq!(carries.len(), 1);
		assert_eq!(
			carries[0].session_key.as_deref(),
			Some("agent:main:project-alpha")
		);

		let events = manager.repo.list_events(&project.id, 10).await.unwrap();
		assert!(events.iter().any(|e| e.event_type == "session_rotated"));
	}

	#[tokio::test]
	async fn test_resume_requires_archived() {
		let manager = manager().await;
		manager.repo.create_project("Alpha", "", "", "").await.unwrap();

		let err = manager.resume_project("alpha", "alice").await.unwrap_err();
		assert!(matches!(err, ProjectError::NotArchived(_)));

		manager.repo.archive_project("alpha").await.unwrap();
		let resumed = manager.resume_project("alpha", "alice").await.unwrap();
		assert_eq!(resumed.status, ProjectStatus::Active);
		assert_eq!(resumed.session_version, 2);
		assert_eq!(resumed.active_session, "agent:main:project-alpha-v2");

		// Resume carries nothing forward.
		let carries = manager
			.repo
			.list_memory(&resumed.id, Some(MemoryKind::ContextCarry))
			.await
			.unwrap();
		assert!(carries.is_empty());
	}

	#[tokio::test]
	async fn test_preamble_sections() {
		let manager = manager().await;
		let project = manager
			.repo
			.create_project("Alpha", "raft consensus service", "https://git/x/alpha", "alice")
			.await
			.unwrap();
		manager
			.repo
			.add_memory(&project.id, MemoryKind::Decision, "use sqlite", None)
			.await
			.unwrap();
		manager
			.repo
			.add_memory(&project.id, MemoryKind::Blocker, "prod creds missing", None)
			.await
			.unwrap();
		manager.repo.create_project("Beta", "", "", "").await.unwrap();

		let preamble = manager.build_context_preamble(&project).await.unwrap();
		assert!(preamble.contains("Project: Alpha (`alpha`)"));
		assert!(preamble.contains("Repository: https://git/x/alpha"));
		assert!(preamble.contains("1. use sqlite"));
		assert!(preamble.contains("1. prod creds missing"));
		assert!(preamble.contains("- beta:"));
		// The project itself is excluded from its own index.
		assert!(!preamble.contains("- alpha:"));
	}

	#[tokio::test]
	async fn test_resume_then_status_flow() {
		let manager = manager().await;
		manager.repo.create_project("Gamma", "", "", "").await.unwrap();
		manager.repo.archive_project("gamma").await.unwrap();

		let resumed = manager.resume_project("gamma", "bot").await.unwrap();
		assert!(resumed.archived_at.is_none());

		// Archive → resume again bumps once more.
		manager.repo.archive_project("gamma").await.unwrap();
		let again = manager.resume_project("gamma", "bot").await.unwrap();
		assert_eq!(again.session_version, 3);
		assert_eq!(again.active_session, "agent:main:project-gamma-v3");
	}
}
