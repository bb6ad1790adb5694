// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Webhook callback delivery.
//!
//! Terminal task states are POSTed to the caller-supplied URL with bounded
//! retries. Delivery is at-least-once: receivers must tolerate the odd
//! duplicate when a retry races a slow 2xx.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("drover-agent/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
	#[error("callback request failed: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("callback returned status {status} (attempt {attempts})")]
	Status { status: u16, attempts: u32 },

	#[error("callback exhausted {attempts} attempts: {last_error}")]
	Exhausted { attempts: u32, last_error: String },
}

pub type Result<T> = std::result::Result<T, CallbackError>;

/// Wire payload POSTed to the callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
	pub task_id: String,
	#[serde(rename = "type")]
	pub task_type: String,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CallbackConfig {
	/// Additional attempts after the first (total attempts = retries + 1).
	pub retries: u32,
	/// Base delay; attempt N waits `delay * N` before firing.
	pub retry_delay: Duration,
	/// Per-request timeout.
	pub request_timeout: Duration,
}

impl Default for CallbackConfig {
	fn default() -> Self {
		Self {
			retries: 2,
			retry_delay: Duration::from_secs(2),
			request_timeout: Duration::from_secs(10),
		}
	}
}

#[derive(Clone)]
pub struct CallbackClient {
	http: reqwest::Client,
	config: CallbackConfig,
}

impl CallbackClient {
	pub fn new(config: CallbackConfig) -> Self {
		let http = reqwest::Client::builder()
			.timeout(config.request_timeout)
			.user_agent(USER_AGENT)
			.build()
			.unwrap_or_default();
		Self { http, config }
	}

	/// POST the payload to `url`, retrying on any non-2xx or transport
	/// failure. An empty URL is a no-op success.
	#[tracing::instrument(skip(self, payload), fields(task_id = %payload.task_id))]
	pub async fn deliver(&self, url: &str, payload: &CallbackPayload) -> Result<()> {
		if url.is_empty() {
			return Ok(());
		}

		let attempts = self.config.retries + 1;
		let mut last_error = String::new();

		for attempt in 0..attempts {
			if attempt > 0 {
				tokio::time::sleep(self.config.retry_delay * attempt).await;
			}

			match self.http.post(url).json(payload).send().await {
				Ok(response) => {
					let status = response.status();
					if status.is_success() {
						tracing::debug!(url, attempt, "callback delivered");
						return Ok(());
					}
					last_error = format!("status {}", status.as_u16());
					tracing::warn!(url, attempt, status = status.as_u16(), "callback rejected");
				}
				Err(e) => {
					last_error = e.to_string();
					tracing::warn!(url, attempt, error = %e, "callback attempt failed");
				}
			}
		}

		Err(CallbackError::Exhausted {
			attempts,
			last_error,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	fn payload() -> CallbackPayload {
		CallbackPayload {
			task_id: "t1".to_string(),
			task_type: "noop".to_string(),
			status: "completed".to_string(),
			result: Some(serde_json::json!({"ok": true})),
			error: None,
			completed_at: Some(Utc::now()),
		}
	}

	fn client() -> CallbackClient {
		CallbackClient::new(CallbackConfig {
			retries: 2,
			retry_delay: Duration::from_millis(10),
			request_timeout: Duration::from_secs(1),
		})
	}

	async fn serve(app: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{addr}")
	}

	#[tokio::test]
	async fn test_empty_url_is_noop() {
		client().deliver("", &payload()).await.unwrap();
	}

	#[tokio::test]
	async fn test_delivers_json_body() {
		let seen: Arc<tokio::sync::Mutex<Option<serde_json::Value>>> =
			Arc::new(tokio::sync::Mutex::new(None));
		let app = Router::new().route(
			"/hook",
			post({
				let seen = Arc::clone(&seen);
				move |Json(body): Json<serde_json::Value>| {
					let seen = Arc::clone(&seen);
					async move {
						*seen.lock().await = Some(body);
						StatusCode::OK
					}
				}
			}),
		);
		let base = serve(app).await;

		client()
			.deliver(&format!("{base}/hook"), &payload())
			.await
			.unwrap();

		let body = seen.lock().await.clone().unwrap();
		assert_eq!(body["task_id"], "t1");
		assert_eq!(body["type"], "noop");
		assert_eq!(body["status"], "completed");
		assert_eq!(body["result"]["ok"], true);
		assert!(body.get("error").is_none());
	}

	#[tokio::test]
	async fn test_retries_until_success() {
		#[derive(Clone)]
		struct Counter(Arc<AtomicU32>);

		async fn flaky(State(Counter(hits)): State<Counter>) -> StatusCode {
			if hits.fetch_add(1, Ordering::SeqCst) < 2 {
				StatusCode::BAD_GATEWAY
			} else {
				StatusCode::OK
			}
		}

		let hits = Arc::new(AtomicU32::new(0));
		let app = Router::new()
			.route("/hook", post(flaky))
			.with_state(Counter(Arc::clone(&hits)));
		let base = serve(app).await;

		client()
			.deliver(&format!("{base}/hook"), &payload())
			.await
			.unwrap();
		assert_eq!(hits.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_exhaustion_carries_last_error() {
		async fn always_500() -> StatusCode {
			StatusCode::INTERNAL_SERVER_ERROR
		}

		let app = Router::new().route("/hook", post(always_500));
		let base = serve(app).await;

		let err = client()
			.deliver(&format!("{base}/hook"), &payload())
			.await
			.unwrap_err();
		match err {
			CallbackError::Exhausted {
				attempts,
				last_error,
			} => {
				assert_eq!(attempts, 3);
				assert!(last_error.contains("500"));
			}
			other => panic!("expected Exhausted, got: {other:?}"),
		}
	}
}
