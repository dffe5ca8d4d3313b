//! Wallet connection and session types.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Snapshot of the wallet connector.
///
/// `open` is true while the connector is mid-handshake (its connect dialog
/// is showing); `selected_network_id` is `None` when no wallet is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectorState {
	pub open: bool,
	pub selected_network_id: Option<u64>,
}

impl ConnectorState {
	/// True when a wallet is connected and the handshake has finished.
	pub fn is_settled_connection(&self) -> bool {
		!self.open && self.selected_network_id.is_some()
	}
}

/// The account a connected wallet exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
	pub address: Address,
	pub chain_id: u64,
}

/// The binding between a connected wallet and an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
	/// Canonical lowercase `0x` address.
	pub address: String,
	/// Checksummed address, kept for display.
	pub display_address: String,
	pub chain_id: u64,
	/// Identity-store user id.
	pub session_id: String,
}

/// Observable state of the session binder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
	#[default]
	Disconnected,
	/// The wallet reported an address and a bind is pending or in flight.
	Connecting { address: Address, chain_id: u64 },
	Connected(WalletSession),
}

impl SessionState {
	/// True when the binder believes a wallet is attached.
	pub fn is_connected(&self) -> bool {
		!matches!(self, SessionState::Disconnected)
	}

	pub fn session(&self) -> Option<&WalletSession> {
		match self {
			SessionState::Connected(session) => Some(session),
			_ => None,
		}
	}

	pub fn session_id(&self) -> Option<&str> {
		self.session().map(|s| s.session_id.as_str())
	}
}

/// Lowercase `0x`-prefixed rendering of an address.
pub fn canonical_address(address: &Address) -> String {
	address.to_string().to_lowercase()
}
