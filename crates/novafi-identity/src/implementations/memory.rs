//! In-process identity store.

use crate::{AuthSession, IdentityError, IdentityInterface, UserMetadata};
use async_trait::async_trait;
use dashmap::DashMap;
use novafi_types::{ConfigSchema, Schema, ValidationError};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredUser {
	id: String,
	password: String,
	metadata: UserMetadata,
}

/// Keeps accounts in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryIdentityStore {
	users: DashMap<String, StoredUser>,
	next_user: AtomicU64,
	next_token: AtomicU64,
	current: Mutex<Option<AuthSession>>,
}

impl MemoryIdentityStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn user_count(&self) -> usize {
		self.users.len()
	}

	pub fn metadata(&self, email: &str) -> Option<UserMetadata> {
		self.users.get(email).map(|user| user.metadata.clone())
	}

	pub async fn current_session(&self) -> Option<AuthSession> {
		self.current.lock().await.clone()
	}
}

pub struct MemoryIdentitySchema;

impl ConfigSchema for MemoryIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl IdentityInterface for MemoryIdentityStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryIdentitySchema)
	}

	async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
		let user_id = match self.users.get(email) {
			Some(user) if user.password == password => user.id.clone(),
			_ => return Err(IdentityError::InvalidCredentials),
		};

		let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
		let session = AuthSession {
			user_id,
			access_token: format!("token-{}", token),
		};
		*self.current.lock().await = Some(session.clone());
		Ok(session)
	}

	async fn sign_up(
		&self,
		email: &str,
		password: &str,
		metadata: &UserMetadata,
	) -> Result<(), IdentityError> {
		if self.users.contains_key(email) {
			return Err(IdentityError::Rejected("User already registered".to_string()));
		}

		let id = self.next_user.fetch_add(1, Ordering::SeqCst) + 1;
		self.users.insert(
			email.to_string(),
			StoredUser {
				id: format!("user-{}", id),
				password: password.to_string(),
				metadata: metadata.clone(),
			},
		);
		Ok(())
	}

	async fn sign_out(&self) -> Result<(), IdentityError> {
		self.current.lock().await.take();
		Ok(())
	}
}

/// Builds an empty [`MemoryIdentityStore`]; takes no configuration.
pub fn create_identity(_config: &toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	Ok(Box::new(MemoryIdentityStore::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn metadata() -> UserMetadata {
		UserMetadata {
			wallet_address: "0xAbC0000000000000000000000000000000000001".to_string(),
			display_name: "0xAbC0...0001".to_string(),
		}
	}

	#[tokio::test]
	async fn test_register_then_sign_in() {
		let store = MemoryIdentityStore::new();
		let email = "0xabc0000000000000000000000000000000000001@wallet.novafi";
		let password = "0xabc0000000000000000000000000000000000001";

		assert_eq!(
			store.sign_in(email, password).await,
			Err(IdentityError::InvalidCredentials)
		);

		store.sign_up(email, password, &metadata()).await.unwrap();
		assert!(store.sign_up(email, password, &metadata()).await.is_err());
		assert_eq!(store.user_count(), 1);

		let session = store.sign_in(email, password).await.unwrap();
		assert_eq!(session.user_id, "user-1");
		assert_eq!(store.current_session().await, Some(session));
		assert_eq!(store.metadata(email), Some(metadata()));

		assert_eq!(
			store.sign_in(email, "wrong").await,
			Err(IdentityError::InvalidCredentials)
		);

		store.sign_out().await.unwrap();
		assert!(store.current_session().await.is_none());
	}
}
