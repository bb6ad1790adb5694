// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Forge credentials.
//!
//! Installation tokens are short-lived; the cache returns a fresh one and
//! mints on miss under a write lock so concurrent callers mint at most
//! once. Per-owner API clients are created lazily with the double-checked
//! locking pattern.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Tokens this close to expiry are treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
	#[error("token mint failed: {0}")]
	Mint(String),

	#[error("forge request failed: {0}")]
	Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

#[derive(Debug, Clone)]
pub struct MintedToken {
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

/// Mints an installation token against the forge. External implementation;
/// the cache depends only on the capability.
#[async_trait]
pub trait TokenMinter: Send + Sync {
	async fn mint(&self, installation_id: &str) -> Result<MintedToken>;
}

pub struct InstallationTokenCache {
	minter: Arc<dyn TokenMinter>,
	tokens: RwLock<HashMap<String, MintedToken>>,
}

impl InstallationTokenCache {
	pub fn new(minter: Arc<dyn TokenMinter>) -> Self {
		Self {
			minter,
			tokens: RwLock::new(HashMap::new()),
		}
	}

	fn is_fresh(token: &MintedToken) -> bool {
		token.expires_at - Utc::now() > Duration::seconds(EXPIRY_MARGIN_SECS)
	}

	/// A valid token for the installation, minted on miss or near-expiry.
	pub async fn token(&self, installation_id: &str) -> Result<String> {
		{
			let tokens = self.tokens.read().await;
			if let Some(cached) = tokens.get(installation_id) {
				if Self::is_fresh(cached) {
					return Ok(cached.token.clone());
				}
			}
		}

		let mut tokens = self.tokens.write().await;
		// Another caller may have minted while we waited for the lock.
		if let Some(cached) = tokens.get(installation_id) {
			if Self::is_fresh(cached) {
				return Ok(cached.token.clone());
			}
		}

		let minted = self.minter.mint(installation_id).await?;
		debug!(installation_id, expires_at = %minted.expires_at, "installation token minted");
		let token = minted.token.clone();
		tokens.insert(installation_id.to_string(), minted);
		Ok(token)
	}

	/// Drop a cached token (e.g. after a 401 from the forge).
	pub async fn invalidate(&self, installation_id: &str) {
		self.tokens.write().await.remove(installation_id);
	}
}

/// A minimal owner-scoped forge API client.
pub struct ForgeClient {
	pub owner: String,
	pub http: reqwest::Client,
}

impl ForgeClient {
	fn new(owner: &str) -> Self {
		Self {
			owner: owner.to_string(),
			http: reqwest::Client::new(),
		}
	}
}

/// Lazily created per-owner clients.
#[derive(Default)]
pub struct ClientCache {
	clients: RwLock<HashMap<String, Arc<ForgeClient>>>,
}

impl ClientCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn client_for(&self, owner: &str) -> Arc<ForgeClient> {
		{
			let clients = self.clients.read().await;
			if let Some(client) = clients.get(owner) {
				return Arc::clone(client);
			}
		}

		let mut clients = self.clients.write().await;
		// Double-checked: the first writer wins.
		if let Some(client) = clients.get(owner) {
			return Arc::clone(client);
		}
		let client = Arc::new(ForgeClient::new(owner));
		clients.insert(owner.to_string(), Arc::clone(&client));
		debug!(owner, "forge client created");
		client
	}
}
