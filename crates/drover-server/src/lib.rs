// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Drover management server.
//!
//! HTTP surface over the task engine, project store, session contexts,
//! approvals, and auto-drive controller, plus the background maintenance
//! jobs and process wiring.

pub mod api;
pub mod api_docs;
pub mod auth_middleware;
pub mod chat_bridge;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod metrics;
pub mod pagination;
pub mod problem;
pub mod rate_limit;
pub mod request_id;
pub mod routes;
pub mod version;

pub use api::{create_app_state, create_router, AppState, LogReloadHandle, RuntimeConfig};
pub use api_docs::ApiDoc;
pub use error::ServerError;
pub use problem::Problem;
