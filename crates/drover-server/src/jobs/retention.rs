// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Periodic retention sweep over every durable table, mirrored into the
//! engine's in-memory index.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

use drover_server_config::RetentionConfig;
use drover_server_db::{
	ApprovalRepository, AuditRepository, DeadLetterRepository, JobRepository,
	SessionContextRepository, TaskRepository,
};
use drover_server_engine::TaskEngine;
use drover_server_jobs::{Job, JobContext, JobError, JobOutput, Result};
use drover_server_projects::ProjectRepository;
use drover_server_sessions::SessionContextStore;

pub struct RetentionJob {
	windows: RetentionConfig,
	tasks: Arc<TaskRepository>,
	approvals: Arc<ApprovalRepository>,
	sessions: SessionContextRepository,
	session_store: Arc<SessionContextStore>,
	projects: ProjectRepository,
	dead_letters: Arc<DeadLetterRepository>,
	audit: Arc<AuditRepository>,
	job_runs: Arc<JobRepository>,
	engine: TaskEngine,
}

impl RetentionJob {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		windows: RetentionConfig,
		tasks: Arc<TaskRepository>,
		approvals: Arc<ApprovalRepository>,
		sessions: SessionContextRepository,
		session_store: Arc<SessionContextStore>,
		projects: ProjectRepository,
		dead_letters: Arc<DeadLetterRepository>,
		audit: Arc<AuditRepository>,
		job_runs: Arc<JobRepository>,
		engine: TaskEngine,
	) -> Self {
		Self {
			windows,
			tasks,
			approvals,
			sessions,
			session_store,
			projects,
			dead_letters,
			audit,
			job_runs,
			engine,
		}
	}
}

#[async_trait]
impl Job for RetentionJob {
	fn id(&self) -> &str {
		"retention"
	}

	fn name(&self) -> &str {
		"Retention Sweep"
	}

	fn description(&self) -> &str {
		"Delete expired tasks, approvals, session contexts, thread bindings, dead letters, and audit rows"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput> {
		ctx.check_cancelled()?;
		let now = Utc::now();

		let task_cutoff = now - Duration::days(self.windows.completed_task_days);
		let tasks_deleted = self
			.tasks
			.delete_completed_before(task_cutoff)
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;
		let tasks_evicted = self.engine.evict_completed_before(task_cutoff).await;

		ctx.check_cancelled()?;
		let approvals_deleted = self
			.approvals
			.delete_older_than(now - Duration::hours(self.windows.approval_hours))
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		ctx.check_cancelled()?;
		let session_cutoff = now - Duration::hours(self.windows.session_context_hours);
		let idle_sessions = self
			.sessions
			.idle_before(session_cutoff)
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;
		for session_id in &idle_sessions {
			if let Err(e) = self.sessions.log_cleanup(session_id, "idle").await {
				tracing::warn!(session_id, error = %e, "session cleanup log failed");
			}
		}
		let sessions_deleted = self
			.sessions
			.delete_idle_before(session_cutoff)
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;
		let sessions_expired_in_memory = self.session_store.cleanup().await;

		ctx.check_cancelled()?;
		let threads_deleted = self
			.projects
			.delete_threads_idle_before(now - Duration::days(self.windows.thread_days))
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		ctx.check_cancelled()?;
		let dead_letters_deleted = self
			.dead_letters
			.delete_resolved_before(now - Duration::hours(self.windows.dead_letter_hours))
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		ctx.check_cancelled()?;
		let audit_deleted = self
			.audit
			.delete_older_than(now - Duration::days(self.windows.audit_days))
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		let job_runs_pruned = self
			.job_runs
			.prune_runs_before(now - Duration::days(self.windows.audit_days))
			.await
			.map_err(|e| JobError::retryable(e.to_string()))?;

		Ok(JobOutput {
			message: format!(
				"swept {} tasks, {} approvals, {} sessions, {} threads, {} dead letters, {} audit rows",
				tasks_deleted,
				approvals_deleted,
				sessions_deleted,
				threads_deleted,
				dead_letters_deleted,
				audit_deleted
			),
			detail: Some(serde_json::json!({
				"tasks_deleted": tasks_deleted,
				"tasks_evicted_from_memory": tasks_evicted,
				"approvals_deleted": approvals_deleted,
				"sessions_deleted": sessions_deleted,
				"sessions_expired_in_memory": sessions_expired_in_memory,
				"threads_deleted": threads_deleted,
				"dead_letters_deleted": dead_letters_deleted,
				"audit_deleted": audit_deleted,
				"job_runs_pruned": job_runs_pruned,
			})),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use drover_server_db::testing::create_test_pool;
	use drover_server_db::TaskRow;
	use drover_server_engine::EngineConfig;

	#[tokio::test]
	async fn test_retention_sweeps_all_tables() {
		let pool = create_test_pool().await;
		let tasks = Arc::new(TaskRepository::new(pool.clone()));
		let approvals = Arc::new(ApprovalRepository::new(pool.clone()));
		let sessions = SessionContextRepository::new(pool.clone());
		let session_store = Arc::new(SessionContextStore::new());
		let projects = ProjectRepository::new(pool.clone());
		let dead_letters = Arc::new(DeadLetterRepository::new(pool.clone()));
		let audit = Arc::new(AuditRepository::new(pool.clone()));
		let job_runs = Arc::new(JobRepository::new(pool.clone()));
		let engine = TaskEngine::new(EngineConfig::default());

		// Seed one expired row per table.
		let old = Utc::now() - Duration::days(30);
		tasks
			.upsert_task(&TaskRow {
				id: "old-task".to_string(),
				task_type: "noop".to_string(),
				params: serde_json::json!({}),
				caller_id: None,
				callback_url: None,
				response_channel: None,
				response_thread: None,
				project_id: None,
				session_key: None,
				ttl_ms: None,
				status: "completed".to_string(),
				result: None,
				error: None,
				created_at: old,
				started_at: Some(old),
				completed_at: Some(old),
			})
			.await
			.unwrap();
		approvals
			.insert(&drover_server_db::PendingApproval {
				id: "old-approval".to_string(),
				task_id: "old-task".to_string(),
				caller_id: None,
				permission: "x".to_string(),
				action: "x".to_string(),
				resource: "y".to_string(),
				channel: None,
				thread_ts: None,
				created_at: old,
			})
			.await
			.unwrap();
		sessions
			.upsert(&drover_server_db::SessionContextRow {
				session_id: "chat-OLD".to_string(),
				channel: "OLD".to_string(),
				thread_ts: None,
				updated_at: old,
			})
			.await
			.unwrap();

		let job = RetentionJob::new(
			RetentionConfig::default(),
			tasks.clone(),
			approvals.clone(),
			sessions.clone(),
			session_store,
			projects,
			dead_letters,
			audit,
			job_runs,
			engine,
		);

		let ctx = JobContext {
			run_id: "r1".to_string(),
			cancellation_token: Default::default(),
		};
		let output = job.run(&ctx).await.unwrap();
		let detail = output.detail.unwrap();
		assert_eq!(detail["tasks_deleted"], 1);
		assert_eq!(detail["approvals_deleted"], 1);
		assert_eq!(detail["sessions_deleted"], 1);

		assert!(tasks.get_task("old-task").await.unwrap().is_none());
		assert!(approvals.get("old-approval").await.unwrap().is_none());
		assert!(sessions.get("chat-OLD").await.unwrap().is_none());
	}
}
