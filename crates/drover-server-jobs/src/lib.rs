// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Background job scheduler.
//!
//! Periodic maintenance jobs (retention sweeps, approval TTL, dead-letter
//! retries, drive expiry) register here; runs are recorded in SQLite with
//! retry/backoff and aggregated into a health signal.

pub mod error;
pub mod health;
pub mod job;
pub mod scheduler;

pub use drover_server_db::{JobDefinition, JobRepository, JobRun, JobStatus};
pub use error::{JobError, Result};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus};
pub use job::{Job, JobContext, JobOutput};
pub use scheduler::JobScheduler;
