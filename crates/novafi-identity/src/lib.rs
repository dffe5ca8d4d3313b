//! Identity store abstraction.
//!
//! The identity store gives every wallet a persistent application account.
//! The client only needs password sign-in, sign-up with profile metadata and
//! sign-out; the store keeps its own notion of the current session.

use async_trait::async_trait;
use novafi_types::ConfigSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod implementations {
	pub mod memory;
	pub mod supabase;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
	/// The email/password pair is unknown to the store.
	#[error("Invalid login credentials")]
	InvalidCredentials,
	/// The store refused the request.
	#[error("{0}")]
	Rejected(String),
	/// The store could not be reached or answered with something unreadable.
	#[error("Identity store request failed: {0}")]
	Request(String),
	#[error("Invalid configuration: {0}")]
	Config(String),
}

/// Profile metadata attached to an account at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
	pub wallet_address: String,
	pub display_name: String,
}

/// An authenticated identity-store session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
	pub user_id: String,
	pub access_token: String,
}

#[async_trait]
pub trait IdentityInterface: Send + Sync {
	/// Returns the configuration schema for this store.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError>;

	async fn sign_up(
		&self,
		email: &str,
		password: &str,
		metadata: &UserMetadata,
	) -> Result<(), IdentityError>;

	/// Ends the current session. Succeeds when there is none.
	async fn sign_out(&self) -> Result<(), IdentityError>;
}

/// Shared handle over the configured identity store.
pub struct IdentityService {
	backend: Box<dyn IdentityInterface>,
}

impl IdentityService {
	pub fn new(backend: Box<dyn IdentityInterface>) -> Self {
		Self { backend }
	}

	pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
		debug!(email, "Signing in");
		self.backend.sign_in(email, password).await
	}

	pub async fn sign_up(
		&self,
		email: &str,
		password: &str,
		metadata: &UserMetadata,
	) -> Result<(), IdentityError> {
		debug!(email, display_name = %metadata.display_name, "Registering account");
		self.backend.sign_up(email, password, metadata).await
	}

	pub async fn sign_out(&self) -> Result<(), IdentityError> {
		self.backend.sign_out().await
	}
}
