//! Transaction handles and receipts.

use alloy::primitives::{Log, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl TransactionHash {
	/// Shortened form for log lines.
	pub fn truncated(&self) -> String {
		let hex = hex::encode(self.0);
		format!("0x{}..", &hex[..8])
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

/// Receipt of a confirmed transaction.
///
/// Logs are kept undecoded; callers decode them against the events they
/// expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	/// Whether the transaction executed without reverting.
	pub success: bool,
	pub logs: Vec<Log>,
}
