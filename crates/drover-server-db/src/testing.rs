// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test fixtures shared across crates.

use sqlx::sqlite::SqlitePool;

/// In-memory pool with the full schema applied.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
	crate::migrations::run_migrations(&pool).await.unwrap();
	pool
}
