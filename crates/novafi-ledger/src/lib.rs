//! Ledger gateway for the marketplace contract.
//!
//! The ledger is the source of truth for intents and proposals. Its read
//! interface is deliberately narrow (counters plus per-ID lookups), so this
//! crate only translates each entry point into typed values and hands write
//! calls to the connected wallet. Combining reads into domain objects is the
//! aggregator's job.

use alloy::primitives::U256;
use async_trait::async_trait;
use novafi_types::{
	Address, ConfigSchema, Counters, IntentBasicInfo, IntentId, IntentStatusInfo, Proposal,
	ProposalId, TransactionHash, TransactionReceipt,
};
use thiserror::Error;
use tracing::info;

pub mod contract;
pub mod events;

pub use events::{created_intent_id, created_proposal_id, LedgerEvent};

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
	/// A write was attempted with no wallet connected.
	#[error("No wallet connected")]
	NoSigner,
	/// The call reverted or the node rejected it.
	#[error("{0}")]
	Call(String),
	/// The ledger answered with something that does not fit the domain types.
	#[error("Failed to decode ledger response: {0}")]
	Decode(String),
	#[error("Invalid configuration: {0}")]
	Config(String),
}

/// One method per contract entry point.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for this gateway.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn get_counters(&self) -> Result<Counters, GatewayError>;

	async fn get_intent_basic_info(&self, id: IntentId) -> Result<IntentBasicInfo, GatewayError>;

	async fn get_intent_status(&self, id: IntentId) -> Result<IntentStatusInfo, GatewayError>;

	/// Proposal IDs of an intent in the order the ledger recorded them.
	async fn get_intent_proposals(&self, id: IntentId) -> Result<Vec<ProposalId>, GatewayError>;

	async fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GatewayError>;

	/// IDs of intents created by `owner`, in creation order.
	async fn get_user_intents(&self, owner: Address) -> Result<Vec<IntentId>, GatewayError>;

	async fn create_intent(&self, description: &str) -> Result<TransactionHash, GatewayError>;

	async fn create_proposal(
		&self,
		intent_id: IntentId,
		amount: U256,
		message: &str,
	) -> Result<TransactionHash, GatewayError>;

	/// Accepts a proposal, transferring `value` to the contract.
	async fn accept_proposal(
		&self,
		proposal_id: ProposalId,
		value: U256,
	) -> Result<TransactionHash, GatewayError>;

	async fn reject_proposal(&self, proposal_id: ProposalId)
		-> Result<TransactionHash, GatewayError>;

	async fn cancel_intent(&self, intent_id: IntentId) -> Result<TransactionHash, GatewayError>;

	/// Waits until the transaction is included and returns its receipt.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, GatewayError>;
}

/// Converts a ledger integer into a 64-bit ID.
pub(crate) fn to_u64(value: U256, field: &str) -> Result<u64, GatewayError> {
	u64::try_from(value)
		.map_err(|_| GatewayError::Decode(format!("{} does not fit in 64 bits: {}", field, value)))
}

/// Shared handle over the configured gateway.
///
/// Adds logging around writes; reads pass straight through.
pub struct LedgerService {
	gateway: Box<dyn LedgerInterface>,
}

impl LedgerService {
	pub fn new(gateway: Box<dyn LedgerInterface>) -> Self {
		Self { gateway }
	}

	pub async fn get_counters(&self) -> Result<Counters, GatewayError> {
		self.gateway.get_counters().await
	}

	pub async fn get_intent_basic_info(&self, id: IntentId) -> Result<IntentBasicInfo, GatewayError> {
		self.gateway.get_intent_basic_info(id).await
	}

	pub async fn get_intent_status(&self, id: IntentId) -> Result<IntentStatusInfo, GatewayError> {
		self.gateway.get_intent_status(id).await
	}

	pub async fn get_intent_proposals(&self, id: IntentId) -> Result<Vec<ProposalId>, GatewayError> {
		self.gateway.get_intent_proposals(id).await
	}

	pub async fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GatewayError> {
		self.gateway.get_proposal(id).await
	}

	pub async fn get_user_intents(&self, owner: Address) -> Result<Vec<IntentId>, GatewayError> {
		self.gateway.get_user_intents(owner).await
	}

	pub async fn create_intent(&self, description: &str) -> Result<TransactionHash, GatewayError> {
		let hash = self.gateway.create_intent(description).await?;
		info!(tx_hash = %hash.truncated(), "Submitted intent creation");
		Ok(hash)
	}

	pub async fn create_proposal(
		&self,
		intent_id: IntentId,
		amount: U256,
		message: &str,
	) -> Result<TransactionHash, GatewayError> {
		let hash = self.gateway.create_proposal(intent_id, amount, message).await?;
		info!(tx_hash = %hash.truncated(), intent_id = %intent_id, "Submitted proposal");
		Ok(hash)
	}

	pub async fn accept_proposal(
		&self,
		proposal_id: ProposalId,
		value: U256,
	) -> Result<TransactionHash, GatewayError> {
		let hash = self.gateway.accept_proposal(proposal_id, value).await?;
		info!(tx_hash = %hash.truncated(), proposal_id = %proposal_id, %value, "Submitted acceptance");
		Ok(hash)
	}

	pub async fn reject_proposal(
		&self,
		proposal_id: ProposalId,
	) -> Result<TransactionHash, GatewayError> {
		let hash = self.gateway.reject_proposal(proposal_id).await?;
		info!(tx_hash = %hash.truncated(), proposal_id = %proposal_id, "Submitted rejection");
		Ok(hash)
	}

	pub async fn cancel_intent(&self, intent_id: IntentId) -> Result<TransactionHash, GatewayError> {
		let hash = self.gateway.cancel_intent(intent_id).await?;
		info!(tx_hash = %hash.truncated(), intent_id = %intent_id, "Submitted cancellation");
		Ok(hash)
	}

	pub async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, GatewayError> {
		let receipt = self.gateway.wait_for_confirmation(hash).await?;
		info!(
			tx_hash = %hash.truncated(),
			block = receipt.block_number,
			success = receipt.success,
			"Transaction confirmed"
		);
		Ok(receipt)
	}
}
