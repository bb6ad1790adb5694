// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Token-bucket rate limiting keyed by remote address.

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

use crate::api::AppState;
use crate::error::ServerError;

struct Bucket {
	tokens: f64,
	last_refill: Instant,
}

#[derive(Default)]
pub struct RateLimiter {
	buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Try to take one token for `key` at `rps` sustained, `burst` peak.
	pub fn allow(&self, key: &str, rps: f64, burst: u32) -> bool {
		let mut buckets = self.buckets.lock().expect("rate limiter poisoned");
		let now = Instant::now();
		let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
			tokens: burst as f64,
			last_refill: now,
		});

		let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
		bucket.tokens = (bucket.tokens + elapsed * rps).min(burst as f64);
		bucket.last_refill = now;

		if bucket.tokens >= 1.0 {
			bucket.tokens -= 1.0;
			true
		} else {
			false
		}
	}

	/// Drop buckets idle long enough to be full again.
	pub fn shrink(&self, rps: f64, burst: u32) {
		let mut buckets = self.buckets.lock().expect("rate limiter poisoned");
		let refill_secs = if rps > 0.0 { burst as f64 / rps } else { 0.0 };
		buckets.retain(|_, b| b.last_refill.elapsed().as_secs_f64() < refill_secs);
	}
}

fn client_key(req: &Request) -> String {
	if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
		return addr.ip().to_string();
	}
	// Behind a proxy (or in tests) fall back to the forwarded address.
	req.headers()
		.get("x-forwarded-for")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.split(',').next())
		.map(|v| v.trim().to_string())
		.unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
	State(state): State<AppState>,
	req: Request,
	next: Next,
) -> Result<Response, ServerError> {
	let (rps, burst) = {
		let runtime = state.runtime.read().await;
		(runtime.rate_limit_rps, state.config.http.rate_limit_burst)
	};

	let key = client_key(&req);
	if !state.rate_limiter.allow(&key, rps, burst) {
		debug!(%key, "request rate limited");
		return Err(ServerError::RateLimited);
	}

	Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_burst_then_deny() {
		let limiter = RateLimiter::new();
		for _ in 0..5 {
			assert!(limiter.allow("1.2.3.4", 1.0, 5));
		}
		assert!(!limiter.allow("1.2.3.4", 1.0, 5));
		// A different address has its own bucket.
		assert!(limiter.allow("5.6.7.8", 1.0, 5));
	}

	#[test]
	fn test_refill_over_time() {
		let limiter = RateLimiter::new();
		for _ in 0..2 {
			assert!(limiter.allow("k", 1000.0, 2));
		}
		assert!(!limiter.allow("k", 1000.0, 2));
		std::thread::sleep(std::time::Duration::from_millis(5));
		assert!(limiter.allow("k", 1000.0, 2));
	}
}
