// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
	#[error("project {0} has no drive interval configured")]
	NoInterval(String),

	#[error(transparent)]
	Project(#[from] drover_server_projects::ProjectError),

	#[error("forwarding failed: {0}")]
	Forward(String),
}

pub type Result<T> = std::result::Result<T, DriveError>;
