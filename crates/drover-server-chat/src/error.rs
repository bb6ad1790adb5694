// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
	#[error("chat delivery failed: {0}")]
	Delivery(String),

	#[error("invalid duration: {0}")]
	InvalidDuration(String),

	#[error("drive control failed: {0}")]
	Drive(String),

	#[error(transparent)]
	Project(#[from] drover_server_projects::ProjectError),

	#[error(transparent)]
	Engine(#[from] drover_server_engine::EngineError),

	#[error(transparent)]
	Db(#[from] drover_server_db::DbError),
}

pub type Result<T> = std::result::Result<T, ChatError>;
