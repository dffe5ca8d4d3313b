//! Local private-key wallet.
//!
//! Stands in for a browser wallet: the key lives in configuration and the
//! connect handshake completes immediately. Useful for scripts, the CLI and
//! tests.

use crate::{WalletError, WalletInterface};
use alloy::network::EthereumWallet;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use novafi_types::{
	validate_private_key, ConfigSchema, ConnectorState, Field, FieldType, Schema,
	ValidationError, WalletAccount,
};
use tokio::sync::RwLock;
use tracing::info;

pub struct LocalWallet {
	signer: PrivateKeySigner,
	chain_id: u64,
	state: RwLock<ConnectorState>,
}

impl LocalWallet {
	/// Creates a disconnected wallet from a hex-encoded private key.
	pub fn new(private_key_hex: &str, chain_id: u64) -> Result<Self, WalletError> {
		Self::with_state(private_key_hex, chain_id, ConnectorState::default())
	}

	/// Creates a wallet that reports itself connected from the start.
	pub fn connected(private_key_hex: &str, chain_id: u64) -> Result<Self, WalletError> {
		let state = ConnectorState {
			open: false,
			selected_network_id: Some(chain_id),
		};
		Self::with_state(private_key_hex, chain_id, state)
	}

	fn with_state(
		private_key_hex: &str,
		chain_id: u64,
		state: ConnectorState,
	) -> Result<Self, WalletError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| WalletError::InvalidKey(format!("Invalid private key: {}", e)))?
			.with_chain_id(Some(chain_id));

		Ok(Self {
			signer,
			chain_id,
			state: RwLock::new(state),
		})
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(validate_private_key),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![Field::new("auto_connect", FieldType::Boolean)],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl WalletInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn state(&self) -> ConnectorState {
		*self.state.read().await
	}

	async fn account(&self) -> Result<Option<WalletAccount>, WalletError> {
		let state = self.state.read().await;
		Ok(state.selected_network_id.map(|chain_id| WalletAccount {
			address: self.signer.address(),
			chain_id,
		}))
	}

	async fn signer(&self) -> Option<EthereumWallet> {
		let state = self.state.read().await;
		state
			.selected_network_id
			.map(|_| EthereumWallet::from(self.signer.clone()))
	}

	async fn open(&self) -> Result<(), WalletError> {
		let mut state = self.state.write().await;
		state.open = false;
		state.selected_network_id = Some(self.chain_id);
		info!(address = %self.signer.address(), chain_id = self.chain_id, "Local wallet connected");
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), WalletError> {
		let mut state = self.state.write().await;
		*state = ConnectorState::default();
		info!(address = %self.signer.address(), "Local wallet disconnected");
		Ok(())
	}
}

/// Builds a [`LocalWallet`] from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded signing key
/// - `chain_id`: network the wallet reports
/// - `auto_connect`: start connected (default: false)
pub fn create_wallet(config: &toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> {
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| WalletError::Config("private_key is required".to_string()))?;

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| WalletError::Config("chain_id is required".to_string()))? as u64;

	let auto_connect = config
		.get("auto_connect")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	let wallet = if auto_connect {
		LocalWallet::connected(private_key, chain_id)?
	} else {
		LocalWallet::new(private_key, chain_id)?
	};
	Ok(Box::new(wallet))
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_connect_cycle() {
		let wallet = LocalWallet::new(KEY, 534351).unwrap();
		assert_eq!(wallet.state().await, ConnectorState::default());
		assert!(wallet.account().await.unwrap().is_none());
		assert!(wallet.signer().await.is_none());

		wallet.open().await.unwrap();
		let account = wallet.account().await.unwrap().unwrap();
		assert_eq!(
			account.address.to_string(),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		);
		assert_eq!(account.chain_id, 534351);
		assert!(wallet.state().await.is_settled_connection());
		assert!(wallet.signer().await.is_some());

		wallet.disconnect().await.unwrap();
		assert!(wallet.account().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_factory() {
		let config: toml::Value = toml::from_str(&format!(
			"private_key = \"{}\"\nchain_id = 1\nauto_connect = true",
			KEY
		))
		.unwrap();
		LocalWalletSchema.validate(&config).unwrap();

		let wallet = create_wallet(&config).unwrap();
		assert_eq!(wallet.state().await.selected_network_id, Some(1));

		let missing: toml::Value = toml::from_str("chain_id = 1").unwrap();
		assert!(create_wallet(&missing).is_err());
	}
}
