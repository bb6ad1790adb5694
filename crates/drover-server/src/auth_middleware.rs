// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bearer-token auth with role levels readonly < operator < admin.
//!
//! Probe endpoints are mounted outside this middleware and always bypass.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
	Readonly,
	Operator,
	Admin,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Readonly => "readonly",
			Role::Operator => "operator",
			Role::Admin => "admin",
		}
	}
}

#[derive(Debug, Clone)]
pub struct AuthContext {
	pub role: Role,
	pub actor: String,
}

impl AuthContext {
	pub fn require(&self, min: Role) -> Result<(), ServerError> {
		if self.role < min {
			return Err(ServerError::Forbidden(format!(
				"{} role required",
				min.as_str()
			)));
		}
		Ok(())
	}
}

fn bearer_token(req: &Request) -> Option<&str> {
	req.headers()
		.get(axum::http::header::AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
}

/// Resolve the caller's role from the bearer token and stash it in request
/// extensions for the [`RequireAuth`] extractor.
pub async fn auth_middleware(
	State(state): State<AppState>,
	mut req: Request,
	next: Next,
) -> Result<Response, ServerError> {
	let auth = &state.config.auth;

	let ctx = if auth.disabled() {
		AuthContext {
			role: Role::Admin,
			actor: "anonymous".to_string(),
		}
	} else {
		let token = bearer_token(&req)
			.ok_or_else(|| ServerError::Unauthorized("missing bearer token".to_string()))?;

		let role = if !auth.admin_key.is_empty() && token == auth.admin_key {
			Role::Admin
		} else if !auth.operator_key.is_empty() && token == auth.operator_key {
			Role::Operator
		} else if !auth.readonly_key.is_empty() && token == auth.readonly_key {
			Role::Readonly
		} else {
			return Err(ServerError::Unauthorized("invalid bearer token".to_string()));
		};

		AuthContext {
			role,
			actor: role.as_str().to_string(),
		}
	};

	req.extensions_mut().insert(ctx);
	Ok(next.run(req).await)
}

/// Extractor handing handlers the resolved auth context.
pub struct RequireAuth(pub AuthContext);

impl<S> FromRequestParts<S> for RequireAuth
where
	S: Send + Sync,
{
	type Rejection = ServerError;

	async fn from_request_parts(
		parts: &mut Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		parts
			.extensions
			.get::<AuthContext>()
			.cloned()
			.map(RequireAuth)
			.ok_or_else(|| ServerError::Unauthorized("authentication required".to_string()))
	}
}
