// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The whole-config layer: every section optional, merged by precedence.

use serde::{Deserialize, Serialize};

use crate::sections::{
	AuthConfigLayer, DatabaseConfigLayer, DriveConfigLayer, EngineConfigLayer, HttpConfigLayer,
	IntegrationsConfigLayer, LoggingConfigLayer, RetentionConfigLayer,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	pub http: Option<HttpConfigLayer>,
	pub auth: Option<AuthConfigLayer>,
	pub database: Option<DatabaseConfigLayer>,
	pub engine: Option<EngineConfigLayer>,
	pub drive: Option<DriveConfigLayer>,
	pub retention: Option<RetentionConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
	pub integrations: Option<IntegrationsConfigLayer>,
}

fn merge_section<T>(slot: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (slot.as_mut(), other) {
		(Some(existing), Some(overlay)) => merge(existing, overlay),
		(None, Some(overlay)) => *slot = Some(overlay),
		_ => {}
	}
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.auth, other.auth, AuthConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.engine, other.engine, EngineConfigLayer::merge);
		merge_section(&mut self.drive, other.drive, DriveConfigLayer::merge);
		merge_section(&mut self.retention, other.retention, RetentionConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(
			&mut self.integrations,
			other.integrations,
			IntegrationsConfigLayer::merge,
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9999),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(base.http.unwrap().port, Some(9999));
	}

	#[test]
	fn test_merge_overlays_within_section() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: Some("127.0.0.1".to_string()),
				port: Some(8000),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(8001),
				..Default::default()
			}),
			..Default::default()
		});
		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("127.0.0.1"));
		assert_eq!(http.port, Some(8001));
	}

	#[test]
	fn test_toml_round_trip() {
		let toml_str = r#"
[http]
port = 8443

[auth]
mode = "none"

[retention]
completed_task_days = 14
"#;
		let layer: ServerConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.http.as_ref().unwrap().port, Some(8443));
		assert_eq!(layer.auth.as_ref().unwrap().mode.as_deref(), Some("none"));
		assert_eq!(
			layer.retention.as_ref().unwrap().completed_task_days,
			Some(14)
		);
		assert!(layer.engine.is_none());
	}
}
