// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Build identity.

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn format_version_info() -> String {
	format!("{NAME} {VERSION}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_info() {
		let info = format_version_info();
		assert!(info.starts_with("drover-server "));
		assert!(!VERSION.is_empty());
	}
}
