//! Supabase (GoTrue) identity store over HTTP.

use crate::{AuthSession, IdentityError, IdentityInterface, UserMetadata};
use async_trait::async_trait;
use novafi_types::{
	validate_http_url, ConfigSchema, Field, FieldType, Schema, ValidationError,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid login credentials";

pub struct SupabaseIdentityStore {
	client: reqwest::Client,
	base_url: String,
	api_key: String,
	/// Access token of the current session, needed for logout.
	access_token: Mutex<Option<String>>,
}

impl SupabaseIdentityStore {
	pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, IdentityError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| IdentityError::Config(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key: api_key.to_string(),
			access_token: Mutex::new(None),
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}/auth/v1/{}", self.base_url, path)
	}

	async fn error_from(response: reqwest::Response) -> IdentityError {
		let status = response.status();
		match response.json::<ErrorBody>().await {
			Ok(body) => classify_error(status, &body),
			Err(_) => IdentityError::Request(format!("Unexpected response status: {}", status)),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_code: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	msg: Option<String>,
	#[serde(default)]
	message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
	id: String,
}

/// Maps an error payload to an [`IdentityError`].
///
/// GoTrue has reported bad credentials both as `invalid_grant` with an
/// `error_description` and as `invalid_credentials` with a `msg`.
fn classify_error(status: StatusCode, body: &ErrorBody) -> IdentityError {
	let message = body
		.msg
		.as_deref()
		.or(body.error_description.as_deref())
		.or(body.message.as_deref())
		.or(body.error.as_deref())
		.unwrap_or("Unknown identity store error")
		.to_string();

	let invalid_credentials = body.error_code.as_deref() == Some("invalid_credentials")
		|| body.error.as_deref() == Some("invalid_grant")
		|| message.contains(INVALID_CREDENTIALS_MESSAGE);

	if invalid_credentials {
		IdentityError::InvalidCredentials
	} else if status.is_server_error() {
		IdentityError::Request(format!("{}: {}", status, message))
	} else {
		IdentityError::Rejected(message)
	}
}

pub struct SupabaseIdentitySchema;

impl ConfigSchema for SupabaseIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("url", FieldType::String).with_validator(validate_http_url),
				Field::new("api_key", FieldType::String).with_validator(|value| {
					if value.as_str().is_some_and(|key| !key.trim().is_empty()) {
						Ok(())
					} else {
						Err("api_key must not be empty".to_string())
					}
				}),
			],
			vec![Field::new(
				"timeout_ms",
				FieldType::Integer {
					min: Some(100),
					max: None,
				},
			)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl IdentityInterface for SupabaseIdentityStore {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SupabaseIdentitySchema)
	}

	async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
		let response = self
			.client
			.post(self.endpoint("token"))
			.query(&[("grant_type", "password")])
			.header("apikey", &self.api_key)
			.json(&serde_json::json!({ "email": email, "password": password }))
			.send()
			.await
			.map_err(|e| IdentityError::Request(e.to_string()))?;

		if !response.status().is_success() {
			return Err(Self::error_from(response).await);
		}

		let token: TokenResponse = response
			.json()
			.await
			.map_err(|e| IdentityError::Request(format!("Failed to parse session: {}", e)))?;

		*self.access_token.lock().await = Some(token.access_token.clone());
		debug!(user_id = %token.user.id, "Identity session established");

		Ok(AuthSession {
			user_id: token.user.id,
			access_token: token.access_token,
		})
	}

	async fn sign_up(
		&self,
		email: &str,
		password: &str,
		metadata: &UserMetadata,
	) -> Result<(), IdentityError> {
		let response = self
			.client
			.post(self.endpoint("signup"))
			.header("apikey", &self.api_key)
			.json(&serde_json::json!({
				"email": email,
				"password": password,
				"data": metadata,
			}))
			.send()
			.await
			.map_err(|e| IdentityError::Request(e.to_string()))?;

		if !response.status().is_success() {
			return Err(Self::error_from(response).await);
		}
		Ok(())
	}

	async fn sign_out(&self) -> Result<(), IdentityError> {
		let Some(token) = self.access_token.lock().await.take() else {
			return Ok(());
		};

		let response = self
			.client
			.post(self.endpoint("logout"))
			.header("apikey", &self.api_key)
			.bearer_auth(token)
			.send()
			.await
			.map_err(|e| IdentityError::Request(e.to_string()))?;

		// An expired token has already ended the session server-side.
		if response.status() == StatusCode::UNAUTHORIZED {
			warn!("Logout reported an expired session");
			return Ok(());
		}
		if !response.status().is_success() {
			return Err(Self::error_from(response).await);
		}
		Ok(())
	}
}

/// Builds a [`SupabaseIdentityStore`] from configuration.
///
/// Configuration parameters:
/// - `url`: project URL, e.g. `https://xyz.supabase.co`
/// - `api_key`: anonymous API key
/// - `timeout_ms`: request timeout (default: 10000)
pub fn create_identity(config: &toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| IdentityError::Config("url is required".to_string()))?;

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| IdentityError::Config("api_key is required".to_string()))?;

	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(10_000) as u64;

	Ok(Box::new(SupabaseIdentityStore::new(
		url,
		api_key,
		Duration::from_millis(timeout_ms),
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn body(json: &str) -> ErrorBody {
		serde_json::from_str(json).unwrap()
	}

	#[test]
	fn test_invalid_credentials_shapes() {
		let legacy = body(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
		assert_eq!(
			classify_error(StatusCode::BAD_REQUEST, &legacy),
			IdentityError::InvalidCredentials
		);

		let current =
			body(r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#);
		assert_eq!(
			classify_error(StatusCode::BAD_REQUEST, &current),
			IdentityError::InvalidCredentials
		);
	}

	#[test]
	fn test_other_errors_keep_message() {
		let rate_limited = body(r#"{"error_code":"over_request_rate_limit","msg":"Too many requests"}"#);
		assert_eq!(
			classify_error(StatusCode::TOO_MANY_REQUESTS, &rate_limited),
			IdentityError::Rejected("Too many requests".to_string())
		);

		let outage = body(r#"{"message":"upstream unavailable"}"#);
		assert!(matches!(
			classify_error(StatusCode::BAD_GATEWAY, &outage),
			IdentityError::Request(_)
		));
	}

	#[test]
	fn test_schema_and_factory() {
		let config: toml::Value =
			toml::from_str("url = \"https://xyz.supabase.co/\"\napi_key = \"anon\"").unwrap();
		SupabaseIdentitySchema.validate(&config).unwrap();
		assert!(create_identity(&config).is_ok());

		let missing_key: toml::Value = toml::from_str("url = \"https://xyz.supabase.co\"").unwrap();
		assert!(SupabaseIdentitySchema.validate(&missing_key).is_err());
		assert!(create_identity(&missing_key).is_err());
	}

	#[test]
	fn test_endpoint_trims_trailing_slash() {
		let store =
			SupabaseIdentityStore::new("https://xyz.supabase.co/", "anon", Duration::from_secs(1))
				.unwrap();
		assert_eq!(store.endpoint("signup"), "https://xyz.supabase.co/auth/v1/signup");
	}
}
