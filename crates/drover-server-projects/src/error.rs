// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
	#[error("project already exists: {0}")]
	AlreadyExists(String),

	#[error("'{0}' is a reserved word")]
	ReservedSlug(String),

	#[error("invalid project name: {0}")]
	InvalidName(String),

	#[error("project not found: {0}")]
	NotFound(String),

	#[error("project {0} is not archived")]
	NotArchived(String),

	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ProjectError>;
