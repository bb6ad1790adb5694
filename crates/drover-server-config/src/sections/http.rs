// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP listener configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpConfigLayer {
	pub host: Option<String>,
	pub port: Option<u16>,
	pub tls_cert_path: Option<String>,
	pub tls_key_path: Option<String>,
	pub cors_origins: Option<Vec<String>>,
	pub rate_limit_rps: Option<f64>,
	pub rate_limit_burst: Option<u32>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.tls_cert_path.is_some() {
			self.tls_cert_path = other.tls_cert_path;
		}
		if other.tls_key_path.is_some() {
			self.tls_key_path = other.tls_key_path;
		}
		if other.cors_origins.is_some() {
			self.cors_origins = other.cors_origins;
		}
		if other.rate_limit_rps.is_some() {
			self.rate_limit_rps = other.rate_limit_rps;
		}
		if other.rate_limit_burst.is_some() {
			self.rate_limit_burst = other.rate_limit_burst;
		}
	}

	pub fn finalize(self) -> HttpConfig {
		HttpConfig {
			host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
			port: self.port.unwrap_or(8080),
			tls_cert_path: self.tls_cert_path,
			tls_key_path: self.tls_key_path,
			cors_origins: self.cors_origins.unwrap_or_default(),
			rate_limit_rps: self.rate_limit_rps.unwrap_or(10.0),
			rate_limit_burst: self.rate_limit_burst.unwrap_or(20),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	pub tls_cert_path: Option<String>,
	pub tls_key_path: Option<String>,
	pub cors_origins: Vec<String>,
	pub rate_limit_rps: f64,
	pub rate_limit_burst: u32,
}

impl Default for HttpConfig {
	fn default() -> Self {
		HttpConfigLayer::default().finalize()
	}
}
