// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Synthetic prompts injected into project sessions.

use drover_server_projects::Project;

/// Local workspace hint derived from the repo URL's last path segment.
pub fn repo_workspace_hint(repo_url: &str) -> Option<String> {
	let trimmed = repo_url.trim_end_matches('/');
	if trimmed.is_empty() {
		return None;
	}
	trimmed
		.rsplit('/')
		.next()
		.map(|segment| segment.trim_end_matches(".git").to_string())
		.filter(|s| !s.is_empty())
}

/// Branch naming convention for project work.
pub fn branch_convention(slug: &str) -> String {
	format!("project/{slug}/<short-description>")
}

/// The periodic "keep working" nudge.
pub fn drive_prompt(project: &Project) -> String {
	let mut out = String::new();

	if !project.current_phase.is_empty() {
		out.push_str(&format!("[Phase: {}]\n", project.current_phase));
	}
	let phases = project.phase_list();
	if !phases.is_empty() {
		out.push_str(&format!("Planned phases: {}\n", phases.join(" → ")));
	}
	if let Some(workspace) = repo_workspace_hint(&project.repo_url) {
		out.push_str(&format!(
			"Repository: {} (local workspace: ./{workspace})\n",
			project.repo_url
		));
	}
	out.push_str(&format!(
		"Branches follow `{}`.\n\n",
		branch_convention(&project.slug)
	));
	out.push_str(
		"Continue working autonomously on the next most valuable step. \
		 Use sub-agents for parallelizable work. Record significant decisions \
		 with `decide`, report blockers with `blocker`, and never commit \
		 directly to main or master.",
	);
	out
}

/// The periodic structured status-report request.
pub fn report_prompt(project: &Project) -> String {
	format!(
		"Post a concise status report for `{}`: what was accomplished since \
		 the last report, what is in progress, open blockers, and the next \
		 planned step. Keep it under ten lines.",
		project.slug
	)
}

/// Sent when the current phase changes mid-drive.
pub fn phase_transition_prompt(project: &Project, phase: &str) -> String {
	format!(
		"The project has moved to the `{phase}` phase. Wind down work from \
		 the previous phase, summarize anything unfinished as a decision or \
		 blocker, and plan the first steps of `{phase}` before continuing.",
	)
	+ &match project.current_phase_model() {
		Some(model) => format!(" The preferred model for this phase is `{model}`."),
		None => String::new(),
	}
}

/// Model-selection control message preceding a drive nudge.
pub fn model_command(alias: &str) -> String {
	format!("/model {alias}")
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn project() -> Project {
		use chrono::Utc;
		use drover_server_projects::ProjectStatus;
		Project {
			id: "p1".to_string(),
			slug: "alpha".to_string(),
			name: "Alpha".to_string(),
			description: String::new(),
			repo_url: "https://git.example.com/org/alpha-service.git".to_string(),
			status: ProjectStatus::Active,
			owner: String::new(),
			active_session: "agent:main:project-alpha".to_string(),
			session_version: 1,
			auto_drive: true,
			drive_interval_ms: 600_000,
			report_interval_ms: 0,
			report_channel: String::new(),
			report_thread: String::new(),
			current_phase: "Design".to_string(),
			phases: "Analysis,Design,Build".to_string(),
			auto_drive_until: None,
			phase_models: HashMap::new(),
			created_at: Utc::now(),
			updated_at: Utc::now(),
			archived_at: None,
		}
	}

	#[test]
	fn test_repo_workspace_hint() {
		assert_eq!(
			repo_workspace_hint("https://git.example.com/org/alpha-service.git"),
			Some("alpha-service".to_string())
		);
		assert_eq!(
			repo_workspace_hint("https://x/y/repo/"),
			Some("repo".to_string())
		);
		assert_eq!(repo_workspace_hint(""), None);
	}

	#[test]
	fn test_drive_prompt_contents() {
		let prompt = drive_prompt(&project());
		assert!(prompt.contains("[Phase: Design]"));
		assert!(prompt.contains("Analysis → Design → Build"));
		assert!(prompt.contains("./alpha-service"));
		assert!(prompt.contains("project/alpha/<short-description>"));
		assert!(prompt.contains("never commit"));
	}

	#[test]
	fn test_phase_transition_mentions_model() {
		let mut p = project();
		p.current_phase = "Build".to_string();
		p.phase_models.insert("Build".to_string(), "sonnet".to_string());
		let prompt = phase_transition_prompt(&p, "Build");
		assert!(prompt.contains("`Build` phase"));
		assert!(prompt.contains("`sonnet`"));
	}
}
