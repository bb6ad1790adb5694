// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{TaskSnapshot, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("unknown task type: {0}")]
	InvalidTaskType(String),

	#[error("task not found: {0}")]
	NotFound(String),

	#[error("task queue is full")]
	QueueFull,

	#[error("task {id} is {status}: {expected}")]
	Conflict {
		id: String,
		status: TaskStatus,
		expected: &'static str,
		/// The task's state at the time of the refused transition.
		snapshot: Box<TaskSnapshot>,
	},

	#[error("engine is not running")]
	NotRunning,
}

impl EngineError {
	pub(crate) fn conflict(expected: &'static str, snapshot: TaskSnapshot) -> Self {
		EngineError::Conflict {
			id: snapshot.id.clone(),
			status: snapshot.status,
			expected,
			snapshot: Box::new(snapshot),
		}
	}
}

pub type Result<T> = std::result::Result<T, EngineError>;
