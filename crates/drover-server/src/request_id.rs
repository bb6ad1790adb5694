// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Request id propagation: honor an inbound X-Request-ID, mint one
//! otherwise, and echo it on every response.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
	let request_id = req
		.headers()
		.get(REQUEST_ID_HEADER)
		.and_then(|v| v.to_str().ok())
		.filter(|v| !v.is_empty())
		.map(str::to_string)
		.unwrap_or_else(|| Uuid::new_v4().to_string());

	if let Ok(value) = HeaderValue::from_str(&request_id) {
		req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
		let mut response = next.run(req).await;
		response.headers_mut().insert(REQUEST_ID_HEADER, value);
		response
	} else {
		next.run(req).await
	}
}
