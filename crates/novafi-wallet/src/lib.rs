//! Wallet connector abstraction.
//!
//! The client never manages keys or connection dialogs itself. It only needs
//! to know whether a wallet is connected, which address and network it
//! exposes, and a signer for submitting transactions. Implementations adapt
//! a concrete wallet to that contract.

use alloy::network::EthereumWallet;
use async_trait::async_trait;
use novafi_types::{ConfigSchema, ConnectorState, WalletAccount};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum WalletError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid configuration: {0}")]
	Config(String),
	#[error("Provider error: {0}")]
	Provider(String),
}

/// Contract every wallet connector fulfils.
#[async_trait]
pub trait WalletInterface: Send + Sync {
	/// Returns the configuration schema for this connector.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Current connection state.
	async fn state(&self) -> ConnectorState;

	/// The connected account, or `None` when nothing is connected.
	async fn account(&self) -> Result<Option<WalletAccount>, WalletError>;

	/// A signer for the connected account, or `None` when nothing is connected.
	async fn signer(&self) -> Option<EthereumWallet>;

	/// Starts the connect handshake.
	async fn open(&self) -> Result<(), WalletError>;

	/// Disconnects the wallet.
	async fn disconnect(&self) -> Result<(), WalletError>;
}

/// Shared handle over the configured wallet connector.
pub struct WalletService {
	connector: Box<dyn WalletInterface>,
}

impl WalletService {
	pub fn new(connector: Box<dyn WalletInterface>) -> Self {
		Self { connector }
	}

	pub async fn state(&self) -> ConnectorState {
		self.connector.state().await
	}

	pub async fn account(&self) -> Result<Option<WalletAccount>, WalletError> {
		self.connector.account().await
	}

	pub async fn signer(&self) -> Option<EthereumWallet> {
		self.connector.signer().await
	}

	pub async fn open(&self) -> Result<(), WalletError> {
		self.connector.open().await
	}

	pub async fn disconnect(&self) -> Result<(), WalletError> {
		self.connector.disconnect().await
	}
}
