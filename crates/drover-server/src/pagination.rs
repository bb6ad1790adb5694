// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared pagination utilities for API handlers.

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PaginationParams {
	pub limit: Option<i32>,
	pub offset: Option<i32>,
}

impl PaginationParams {
	pub fn limit_clamped(&self, default: i32, max: i32) -> i32 {
		self.limit.unwrap_or(default).min(max).max(1)
	}

	pub fn offset_or_default(&self) -> i32 {
		self.offset.unwrap_or(0).max(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pagination_defaults() {
		let params = PaginationParams::default();
		assert_eq!(params.limit_clamped(50, 100), 50);
		assert_eq!(params.offset_or_default(), 0);
	}

	#[test]
	fn test_pagination_clamping() {
		let params = PaginationParams {
			limit: Some(500),
			offset: Some(-5),
		};
		assert_eq!(params.limit_clamped(50, 100), 100);
		assert_eq!(params.offset_or_default(), 0);

		let params = PaginationParams {
			limit: Some(0),
			offset: Some(10),
		};
		assert_eq!(params.limit_clamped(50, 100), 1);
		assert_eq!(params.offset_or_default(), 10);
	}
}
