// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drover_server_db::{JobRun, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHealthStatus {
	pub job_id: String,
	pub name: String,
	pub status: HealthState,
	pub last_run_at: Option<DateTime<Utc>>,
	pub last_error: Option<String>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

/// Three consecutive failures turn a job unhealthy; any failure streak
/// below that is degraded.
pub fn classify(last_run: Option<&JobRun>, consecutive_failures: u32) -> HealthState {
	match last_run {
		None => HealthState::Healthy,
		Some(run) => match run.status {
			JobStatus::Succeeded | JobStatus::Running | JobStatus::Cancelled => HealthState::Healthy,
			JobStatus::Failed => {
				if consecutive_failures >= 3 {
					HealthState::Unhealthy
				} else {
					HealthState::Degraded
				}
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn run(status: JobStatus) -> JobRun {
		JobRun {
			id: "r1".to_string(),
			job_id: "j1".to_string(),
			status,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error: None,
			retry_count: 0,
			triggered_by: "schedule".to_string(),
			detail: None,
		}
	}

	#[test]
	fn test_classify_ladder() {
		assert_eq!(classify(None, 0), HealthState::Healthy);
		assert_eq!(
			classify(Some(&run(JobStatus::Succeeded)), 0),
			HealthState::Healthy
		);
		assert_eq!(
			classify(Some(&run(JobStatus::Failed)), 1),
			HealthState::Degraded
		);
		assert_eq!(
			classify(Some(&run(JobStatus::Failed)), 2),
			HealthState::Degraded
		);
		assert_eq!(
			classify(Some(&run(JobStatus::Failed)), 3),
			HealthState::Unhealthy
		);
	}
}
