// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use drover_server_db::{JobDefinition, JobRepository, JobRun, JobStatus};

use crate::error::{JobError, Result};
use crate::health::{classify, HealthState, JobHealthStatus, JobsHealthStatus};
use crate::job::{CancellationToken, Job, JobContext};

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;

struct RegisteredJob {
	job: Arc<dyn Job>,
	interval: Duration,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: HashMap<String, RegisteredJob>,
	repository: Arc<JobRepository>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(repository: Arc<JobRepository>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: HashMap::new(),
			repository,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				interval,
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let def = JobDefinition {
				id: job_id.clone(),
				name: registered.job.name().to_string(),
				description: registered.job.description().to_string(),
				interval_secs: Some(registered.interval.as_secs() as i64),
				enabled: true,
			};
			self.repository.upsert_definition(&def).await?;

			let job = Arc::clone(&registered.job);
			let repository = Arc::clone(&self.repository);
			let interval = registered.interval;
			let cancellation_token = registered.cancellation_token.clone();
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let job_id = job_id.clone();

			handles.push(tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							if cancellation_token.is_cancelled() {
								continue;
							}
							let _ = run_with_retry(&job, &repository, "schedule", &cancellation_token).await;
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "shutting down periodic job");
							break;
						}
					}
				}
			}));
		}

		info!(job_count = handles.len(), "job scheduler started");
		Ok(())
	}

	/// Run a job now, outside its schedule.
	#[instrument(skip(self))]
	pub async fn trigger(&self, job_id: &str) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_with_retry(
			&registered.job,
			&self.repository,
			"manual",
			&registered.cancellation_token,
		)
		.await
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("job scheduler shut down");
	}

	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		let mut worst = HealthState::Healthy;

		for (job_id, registered) in &self.jobs {
			let last_run = self.repository.last_run(job_id).await.ok().flatten();
			let consecutive_failures = self
				.repository
				.consecutive_failures(job_id)
				.await
				.unwrap_or(0);
			let status = classify(last_run.as_ref(), consecutive_failures);

			if status == HealthState::Unhealthy {
				worst = HealthState::Unhealthy;
			} else if status == HealthState::Degraded && worst != HealthState::Unhealthy {
				worst = HealthState::Degraded;
			}

			jobs.push(JobHealthStatus {
				job_id: job_id.clone(),
				name: registered.job.name().to_string(),
				status,
				last_run_at: last_run.as_ref().map(|r| r.started_at),
				last_error: last_run.and_then(|r| r.error),
				consecutive_failures,
			});
		}

		JobsHealthStatus {
			status: worst,
			jobs,
		}
	}
}

fn backoff_delay_secs(retry: u32) -> u64 {
	(BASE_RETRY_DELAY_SECS << retry.saturating_sub(1).min(10)).min(MAX_RETRY_DELAY_SECS)
}

async fn run_with_retry(
	job: &Arc<dyn Job>,
	repository: &Arc<JobRepository>,
	triggered_by: &str,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let run_id = uuid::Uuid::new_v4().to_string();
	let mut retry_count = 0u32;

	repository
		.insert_run(&JobRun {
			id: run_id.clone(),
			job_id: job.id().to_string(),
			status: JobStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error: None,
			retry_count,
			triggered_by: triggered_by.to_string(),
			detail: None,
		})
		.await?;

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			cancellation_token: cancellation_token.clone(),
		};

		match job.run(&ctx).await {
			Ok(output) => {
				repository
					.finish_run(&run_id, JobStatus::Succeeded, None, output.detail)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "job completed");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				repository
					.finish_run(&run_id, JobStatus::Cancelled, None, None)
					.await?;
				info!(job_id = %job.id(), run_id = %run_id, "job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable }) if retryable && retry_count < MAX_RETRIES => {
				retry_count += 1;
				let delay = backoff_delay_secs(retry_count);
				warn!(
					job_id = %job.id(),
					run_id = %run_id,
					retry_count,
					delay_secs = delay,
					error = %message,
					"job failed, retrying"
				);
				tokio::time::sleep(Duration::from_secs(delay)).await;
			}
			Err(e) => {
				let message = e.to_string();
				repository
					.finish_run(&run_id, JobStatus::Failed, Some(message.clone()), None)
					.await?;
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "job failed");
				return Err(e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::job::JobOutput;
	use async_trait::async_trait;
	use drover_server_db::testing::create_test_pool;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct OkJob;

	#[async_trait]
	impl Job for OkJob {
		fn id(&self) -> &str {
			"ok-job"
		}
		fn name(&self) -> &str {
			"Ok Job"
		}
		fn description(&self) -> &str {
			"Always succeeds"
		}
		async fn run(&self, _ctx: &JobContext) -> Result<JobOutput> {
			Ok(JobOutput {
				message: "done".to_string(),
				detail: Some(serde_json::json!({"n": 1})),
			})
		}
	}

	struct FlakyJob {
		failures_left: AtomicU32,
	}

	#[async_trait]
	impl Job for FlakyJob {
		fn id(&self) -> &str {
			"flaky-job"
		}
		fn name(&self) -> &str {
			"Flaky Job"
		}
		fn description(&self) -> &str {
			"Fails a few times, then succeeds"
		}
		async fn run(&self, _ctx: &JobContext) -> Result<JobOutput> {
			if self.failures_left.load(Ordering::SeqCst) > 0 {
				self.failures_left.fetch_sub(1, Ordering::SeqCst);
				return Err(JobError::retryable("still warming up"));
			}
			Ok(JobOutput {
				message: "finally".to_string(),
				detail: None,
			})
		}
	}

	#[test]
	fn test_backoff_delay() {
		assert_eq!(backoff_delay_secs(1), 1);
		assert_eq!(backoff_delay_secs(2), 2);
		assert_eq!(backoff_delay_secs(3), 4);
		assert_eq!(backoff_delay_secs(10), 60);
	}

	#[tokio::test]
	async fn test_trigger_records_success() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool));
		let mut scheduler = JobScheduler::new(Arc::clone(&repo));
		scheduler.register_periodic(Arc::new(OkJob), Duration::from_secs(3600));
		scheduler.start().await.unwrap();

		let run_id = scheduler.trigger("ok-job").await.unwrap();
		let last = repo.last_run("ok-job").await.unwrap().unwrap();
		assert_eq!(last.id, run_id);
		assert_eq!(last.status, JobStatus::Succeeded);
		assert_eq!(last.detail, Some(serde_json::json!({"n": 1})));

		scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn test_trigger_unknown_job() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool));
		let scheduler = JobScheduler::new(repo);
		let err = scheduler.trigger("nope").await.unwrap_err();
		assert!(matches!(err, JobError::NotFound(id) if id == "nope"));
	}

	#[tokio::test]
	async fn test_health_reflects_failures() {
		struct FailJob;

		#[async_trait]
		impl Job for FailJob {
			fn id(&self) -> &str {
				"fail-job"
			}
			fn name(&self) -> &str {
				"Fail Job"
			}
			fn description(&self) -> &str {
				"Always fails"
			}
			async fn run(&self, _ctx: &JobContext) -> Result<JobOutput> {
				Err(JobError::failed("boom"))
			}
		}

		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool));
		let mut scheduler = JobScheduler::new(Arc::clone(&repo));
		scheduler.register_periodic(Arc::new(FailJob), Duration::from_secs(3600));
		scheduler.start().await.unwrap();

		let _ = scheduler.trigger("fail-job").await;
		let health = scheduler.health_status().await;
		assert_eq!(health.status, HealthState::Degraded);
		assert_eq!(health.jobs[0].consecutive_failures, 1);
		assert_eq!(health.jobs[0].last_error.as_deref(), Some("boom"));

		scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn test_flaky_job_retries_to_success() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool));
		let mut scheduler = JobScheduler::new(Arc::clone(&repo));
		scheduler.register_periodic(
			Arc::new(FlakyJob {
				failures_left: AtomicU32::new(1),
			}),
			Duration::from_secs(3600),
		);
		scheduler.start().await.unwrap();

		scheduler.trigger("flaky-job").await.unwrap();
		let last = repo.last_run("flaky-job").await.unwrap().unwrap();
		assert_eq!(last.status, JobStatus::Succeeded);

		scheduler.shutdown().await;
	}
}
