// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod auth;
pub mod database;
pub mod drive;
pub mod engine;
pub mod http;
pub mod integrations;
pub mod logging;
pub mod retention;

pub use auth::{AuthConfig, AuthConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use drive::{DriveConfig, DriveConfigLayer};
pub use engine::{EngineConfigLayer, EngineSectionConfig};
pub use http::{HttpConfig, HttpConfigLayer};
pub use integrations::{IntegrationsConfig, IntegrationsConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use retention::{RetentionConfig, RetentionConfigLayer};
