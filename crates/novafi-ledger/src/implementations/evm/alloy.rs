//! JSON-RPC ledger gateway built on Alloy.
//!
//! Reads go through a plain HTTP provider. Writes build a signing provider
//! from whatever wallet is connected at call time, so connecting or switching
//! wallets never requires rebuilding the gateway.

use crate::contract::IntentMarketplace::{self, IntentMarketplaceInstance};
use crate::{to_u64, GatewayError, LedgerInterface};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use novafi_types::{
	validate_evm_address, validate_http_url, ConfigSchema, Counters, Field, FieldType,
	IntentBasicInfo, IntentId, IntentStatus, IntentStatusInfo, Proposal, ProposalId,
	ProposalStatus, Schema, TransactionHash, TransactionReceipt, ValidationError,
};
use novafi_wallet::WalletService;
use std::sync::Arc;
use std::time::Duration;

pub struct AlloyLedger {
	rpc_url: reqwest::Url,
	contract_address: Address,
	/// Contract bound to a read-only provider.
	reader: IntentMarketplaceInstance<DynProvider>,
	wallet: Arc<WalletService>,
	confirmations: u64,
	poll_interval: Duration,
	/// `None` waits indefinitely.
	confirmation_timeout: Option<Duration>,
}

impl AlloyLedger {
	pub fn new(
		rpc_url: &str,
		contract_address: Address,
		wallet: Arc<WalletService>,
	) -> Result<Self, GatewayError> {
		let rpc_url: reqwest::Url = rpc_url
			.parse()
			.map_err(|e| GatewayError::Config(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new()
			.connect_http(rpc_url.clone())
			.erased();

		Ok(Self {
			reader: IntentMarketplace::new(contract_address, provider),
			rpc_url,
			contract_address,
			wallet,
			confirmations: 1,
			poll_interval: Duration::from_secs(2),
			confirmation_timeout: None,
		})
	}

	pub fn with_confirmations(mut self, confirmations: u64) -> Self {
		self.confirmations = confirmations.max(1);
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.confirmation_timeout = timeout;
		self
	}

	/// Contract bound to a provider that signs with the connected wallet.
	async fn writer(&self) -> Result<IntentMarketplaceInstance<DynProvider>, GatewayError> {
		let signer = self.wallet.signer().await.ok_or(GatewayError::NoSigner)?;
		let provider = ProviderBuilder::new()
			.wallet(signer)
			.connect_http(self.rpc_url.clone())
			.erased();
		Ok(IntentMarketplace::new(self.contract_address, provider))
	}
}

fn call_error(error: alloy::contract::Error) -> GatewayError {
	GatewayError::Call(error.to_string())
}

fn intent_status(code: u8) -> Result<IntentStatus, GatewayError> {
	IntentStatus::try_from(code).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn proposal_status(code: u8) -> Result<ProposalStatus, GatewayError> {
	ProposalStatus::try_from(code).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Configuration schema for the Alloy gateway.
pub struct AlloyLedgerSchema;

impl ConfigSchema for AlloyLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(validate_http_url),
				Field::new("contract_address", FieldType::String)
					.with_validator(validate_evm_address),
			],
			vec![
				Field::new(
					"confirmations",
					FieldType::Integer {
						min: Some(1),
						max: Some(64),
					},
				),
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: None,
					},
				),
				Field::new(
					"confirmation_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl LedgerInterface for AlloyLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyLedgerSchema)
	}

	async fn get_counters(&self) -> Result<Counters, GatewayError> {
		let counters = self.reader.getCounters().call().await.map_err(call_error)?;
		Ok(Counters {
			total_intents: to_u64(counters.totalIntents, "totalIntents")?,
			total_proposals: to_u64(counters.totalProposals, "totalProposals")?,
		})
	}

	async fn get_intent_basic_info(&self, id: IntentId) -> Result<IntentBasicInfo, GatewayError> {
		let info = self
			.reader
			.getIntentBasicInfo(U256::from(id.0))
			.call()
			.await
			.map_err(call_error)?;

		Ok(IntentBasicInfo {
			id: IntentId(to_u64(info.id, "intent id")?),
			creator: info.creator,
			description: info.description,
			created_at: to_u64(info.createdAt, "createdAt")?,
		})
	}

	async fn get_intent_status(&self, id: IntentId) -> Result<IntentStatusInfo, GatewayError> {
		let status = self
			.reader
			.getIntentStatus(U256::from(id.0))
			.call()
			.await
			.map_err(call_error)?;

		let accepted = to_u64(status.acceptedProposalId, "acceptedProposalId")?;
		Ok(IntentStatusInfo {
			status: intent_status(status.status)?,
			accepted_proposal_id: (accepted != 0).then_some(ProposalId(accepted)),
			proposal_count: to_u64(status.proposalCount, "proposalCount")?,
		})
	}

	async fn get_intent_proposals(&self, id: IntentId) -> Result<Vec<ProposalId>, GatewayError> {
		let ids = self
			.reader
			.getIntentProposals(U256::from(id.0))
			.call()
			.await
			.map_err(call_error)?;

		ids.into_iter()
			.map(|id| to_u64(id, "proposal id").map(ProposalId))
			.collect()
	}

	async fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GatewayError> {
		let proposal = self
			.reader
			.getProposal(U256::from(id.0))
			.call()
			.await
			.map_err(call_error)?;

		Ok(Proposal {
			id: ProposalId(to_u64(proposal.id, "proposal id")?),
			intent_id: IntentId(to_u64(proposal.intentId, "intentId")?),
			solver: proposal.solver,
			amount: proposal.amount,
			message: proposal.message,
			created_at: to_u64(proposal.createdAt, "createdAt")?,
			status: proposal_status(proposal.status)?,
		})
	}

	async fn get_user_intents(&self, owner: Address) -> Result<Vec<IntentId>, GatewayError> {
		let ids = self
			.reader
			.getUserIntents(owner)
			.call()
			.await
			.map_err(call_error)?;

		ids.into_iter()
			.map(|id| to_u64(id, "intent id").map(IntentId))
			.collect()
	}

	async fn create_intent(&self, description: &str) -> Result<TransactionHash, GatewayError> {
		let pending = self
			.writer()
			.await?
			.createIntent(description.to_string())
			.send()
			.await
			.map_err(call_error)?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn create_proposal(
		&self,
		intent_id: IntentId,
		amount: U256,
		message: &str,
	) -> Result<TransactionHash, GatewayError> {
		let pending = self
			.writer()
			.await?
			.createProposal(U256::from(intent_id.0), amount, message.to_string())
			.send()
			.await
			.map_err(call_error)?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn accept_proposal(
		&self,
		proposal_id: ProposalId,
		value: U256,
	) -> Result<TransactionHash, GatewayError> {
		let pending = self
			.writer()
			.await?
			.acceptProposal(U256::from(proposal_id.0))
			.value(value)
			.send()
			.await
			.map_err(call_error)?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn reject_proposal(
		&self,
		proposal_id: ProposalId,
	) -> Result<TransactionHash, GatewayError> {
		let pending = self
			.writer()
			.await?
			.rejectProposal(U256::from(proposal_id.0))
			.send()
			.await
			.map_err(call_error)?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn cancel_intent(&self, intent_id: IntentId) -> Result<TransactionHash, GatewayError> {
		let pending = self
			.writer()
			.await?
			.cancelIntent(U256::from(intent_id.0))
			.send()
			.await
			.map_err(call_error)?;
		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, GatewayError> {
		let provider = self.reader.provider();
		let start_time = tokio::time::Instant::now();

		tracing::info!(
			tx_hash = %hash.truncated(),
			"Waiting for {} confirmations",
			self.confirmations
		);

		loop {
			if let Some(timeout) = self.confirmation_timeout {
				if start_time.elapsed() > timeout {
					return Err(GatewayError::Call(format!(
						"Timeout waiting for {} confirmations after {} seconds",
						self.confirmations,
						timeout.as_secs()
					)));
				}
			}

			let receipt = match provider.get_transaction_receipt(hash.0).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tokio::time::sleep(self.poll_interval).await;
					continue;
				}
				Err(e) => {
					return Err(GatewayError::Call(format!("Failed to get receipt: {}", e)));
				}
			};

			let tx_block = receipt.block_number.unwrap_or(0);
			let current_block = provider
				.get_block_number()
				.await
				.map_err(|e| GatewayError::Call(format!("Failed to get block number: {}", e)))?;

			// The inclusion block counts as the first confirmation.
			let confirmations = current_block.saturating_sub(tx_block) + 1;
			if confirmations >= self.confirmations {
				return Ok(TransactionReceipt {
					hash: TransactionHash(receipt.transaction_hash),
					block_number: tx_block,
					success: receipt.status(),
					logs: receipt
						.inner
						.logs()
						.iter()
						.map(|log| log.inner.clone())
						.collect(),
				});
			}

			tracing::debug!(
				"Waiting for {} more confirmations...",
				self.confirmations - confirmations
			);
			tokio::time::sleep(self.poll_interval).await;
		}
	}
}

/// Builds an [`AlloyLedger`] from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP JSON-RPC endpoint
/// - `contract_address`: deployed marketplace contract
/// - `confirmations`: blocks to wait for (default: 1)
/// - `poll_interval_ms`: receipt polling interval (default: 2000)
/// - `confirmation_timeout_secs`: give up after this long (default: wait forever)
pub fn create_ledger(
	config: &toml::Value,
	wallet: Arc<WalletService>,
) -> Result<Box<dyn LedgerInterface>, GatewayError> {
	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| GatewayError::Config("rpc_url is required".to_string()))?;

	let contract_address: Address = config
		.get("contract_address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| GatewayError::Config("contract_address is required".to_string()))?
		.parse()
		.map_err(|e| GatewayError::Config(format!("Invalid contract address: {}", e)))?;

	let confirmations = config
		.get("confirmations")
		.and_then(|v| v.as_integer())
		.unwrap_or(1) as u64;

	let poll_interval_ms = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(2000) as u64;

	let timeout = config
		.get("confirmation_timeout_secs")
		.and_then(|v| v.as_integer())
		.map(|secs| Duration::from_secs(secs as u64));

	let ledger = AlloyLedger::new(rpc_url, contract_address, wallet)?
		.with_confirmations(confirmations)
		.with_poll_interval(Duration::from_millis(poll_interval_ms))
		.with_confirmation_timeout(timeout);

	Ok(Box::new(ledger))
}

#[cfg(test)]
mod tests {
	use super::*;
	use novafi_wallet::implementations::local::LocalWallet;

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn config(extra: &str) -> toml::Value {
		toml::from_str(&format!(
			"rpc_url = \"http://127.0.0.1:8545\"\ncontract_address = \"0x5FbDB2315678afecb367f032d93F642f64180aa3\"\n{}",
			extra
		))
		.unwrap()
	}

	fn disconnected_wallet() -> Arc<WalletService> {
		Arc::new(WalletService::new(Box::new(LocalWallet::new(KEY, 31337).unwrap())))
	}

	#[test]
	fn test_schema() {
		AlloyLedgerSchema
			.validate(&config("confirmations = 2\nconfirmation_timeout_secs = 60"))
			.unwrap();
		assert!(AlloyLedgerSchema.validate(&config("confirmations = 0")).is_err());

		let bad_address: toml::Value =
			toml::from_str("rpc_url = \"http://127.0.0.1:8545\"\ncontract_address = \"0x1234\"")
				.unwrap();
		assert!(AlloyLedgerSchema.validate(&bad_address).is_err());
	}

	#[tokio::test]
	async fn test_factory_rejects_bad_address() {
		let config: toml::Value =
			toml::from_str("rpc_url = \"http://127.0.0.1:8545\"\ncontract_address = \"nope\"")
				.unwrap();
		assert!(matches!(
			create_ledger(&config, disconnected_wallet()),
			Err(GatewayError::Config(_))
		));
	}

	#[tokio::test]
	async fn test_write_without_wallet_is_no_signer() {
		let ledger = create_ledger(&config(""), disconnected_wallet()).unwrap();
		assert_eq!(
			ledger.create_intent("fix my pipeline").await,
			Err(GatewayError::NoSigner)
		);
		assert_eq!(
			ledger.accept_proposal(ProposalId(1), U256::from(1)).await,
			Err(GatewayError::NoSigner)
		);
	}
}
