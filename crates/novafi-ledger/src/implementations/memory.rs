//! In-process ledger with the marketplace contract's rules.
//!
//! Every write executes immediately and is "mined" into its own block, with
//! the same events the deployed contract emits. Handles created through
//! [`MemoryLedger::with_wallet`] share state, so several wallets can act on
//! one market.

use crate::contract::IntentMarketplace;
use crate::{GatewayError, LedgerInterface};
use alloy::primitives::{keccak256, Address, Log, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use novafi_types::{
	ConfigSchema, Counters, IntentBasicInfo, IntentId, IntentStatus, IntentStatusInfo, Proposal,
	ProposalId, ProposalStatus, Schema, TransactionHash, TransactionReceipt, ValidationError,
};
use novafi_wallet::WalletService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Address the in-memory contract reports as the log emitter.
pub const MEMORY_CONTRACT_ADDRESS: Address = Address::repeat_byte(0x4e);

#[derive(Debug, Clone)]
struct IntentRecord {
	creator: Address,
	description: String,
	created_at: u64,
	status: IntentStatus,
	accepted_proposal: u64,
	proposals: Vec<u64>,
}

#[derive(Default)]
struct LedgerState {
	/// Indexed by `id - 1`.
	intents: Vec<IntentRecord>,
	/// Indexed by `id - 1`.
	proposals: Vec<Proposal>,
	user_intents: HashMap<Address, Vec<u64>>,
	receipts: HashMap<B256, TransactionReceipt>,
	block_number: u64,
	/// Value paid out for accepted proposals, keyed by solver.
	payouts: HashMap<Address, U256>,
}

impl LedgerState {
	fn intent(&self, id: u64) -> Result<&IntentRecord, GatewayError> {
		id.checked_sub(1)
			.and_then(|index| self.intents.get(index as usize))
			.ok_or_else(|| revert("Intent does not exist"))
	}

	fn intent_mut(&mut self, id: u64) -> Result<&mut IntentRecord, GatewayError> {
		id.checked_sub(1)
			.and_then(|index| self.intents.get_mut(index as usize))
			.ok_or_else(|| revert("Intent does not exist"))
	}

	fn proposal(&self, id: u64) -> Result<&Proposal, GatewayError> {
		id.checked_sub(1)
			.and_then(|index| self.proposals.get(index as usize))
			.ok_or_else(|| revert("Proposal does not exist"))
	}

	/// Records a successful transaction carrying `events`.
	fn mine(&mut self, sender: Address, events: Vec<Log>) -> TransactionHash {
		self.block_number += 1;
		let mut preimage = sender.to_vec();
		preimage.extend_from_slice(&self.block_number.to_be_bytes());
		let hash = TransactionHash(keccak256(preimage));

		self.receipts.insert(
			hash.0,
			TransactionReceipt {
				hash,
				block_number: self.block_number,
				success: true,
				logs: events,
			},
		);
		hash
	}
}

fn revert(reason: &str) -> GatewayError {
	GatewayError::Call(format!("execution reverted: {}", reason))
}

fn emit(event: &impl SolEvent) -> Log {
	Log {
		address: MEMORY_CONTRACT_ADDRESS,
		data: event.encode_log_data(),
	}
}

#[derive(Clone)]
pub struct MemoryLedger {
	state: Arc<Mutex<LedgerState>>,
	wallet: Arc<WalletService>,
}

impl MemoryLedger {
	/// Creates an empty ledger whose writes are signed by `wallet`.
	pub fn new(wallet: Arc<WalletService>) -> Self {
		Self {
			state: Arc::new(Mutex::new(LedgerState::default())),
			wallet,
		}
	}

	/// A handle on the same ledger acting through another wallet.
	pub fn with_wallet(&self, wallet: Arc<WalletService>) -> Self {
		Self {
			state: self.state.clone(),
			wallet,
		}
	}

	/// Total value paid to `solver` through accepted proposals.
	pub async fn paid_to(&self, solver: Address) -> U256 {
		self.state
			.lock()
			.await
			.payouts
			.get(&solver)
			.copied()
			.unwrap_or_default()
	}

	async fn sender(&self) -> Result<Address, GatewayError> {
		let account = self
			.wallet
			.account()
			.await
			.map_err(|e| GatewayError::Call(e.to_string()))?;
		account
			.map(|account| account.address)
			.ok_or(GatewayError::NoSigner)
	}

	fn now() -> u64 {
		chrono::Utc::now().timestamp().max(0) as u64
	}
}

pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	async fn get_counters(&self) -> Result<Counters, GatewayError> {
		let state = self.state.lock().await;
		Ok(Counters {
			total_intents: state.intents.len() as u64,
			total_proposals: state.proposals.len() as u64,
		})
	}

	async fn get_intent_basic_info(&self, id: IntentId) -> Result<IntentBasicInfo, GatewayError> {
		let state = self.state.lock().await;
		let intent = state.intent(id.0)?;
		Ok(IntentBasicInfo {
			id,
			creator: intent.creator,
			description: intent.description.clone(),
			created_at: intent.created_at,
		})
	}

	async fn get_intent_status(&self, id: IntentId) -> Result<IntentStatusInfo, GatewayError> {
		let state = self.state.lock().await;
		let intent = state.intent(id.0)?;
		Ok(IntentStatusInfo {
			status: intent.status,
			accepted_proposal_id: (intent.accepted_proposal != 0)
				.then_some(ProposalId(intent.accepted_proposal)),
			proposal_count: intent.proposals.len() as u64,
		})
	}

	async fn get_intent_proposals(&self, id: IntentId) -> Result<Vec<ProposalId>, GatewayError> {
		let state = self.state.lock().await;
		Ok(state
			.intent(id.0)?
			.proposals
			.iter()
			.copied()
			.map(ProposalId)
			.collect())
	}

	async fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GatewayError> {
		let state = self.state.lock().await;
		state.proposal(id.0).cloned()
	}

	async fn get_user_intents(&self, owner: Address) -> Result<Vec<IntentId>, GatewayError> {
		let state = self.state.lock().await;
		Ok(state
			.user_intents
			.get(&owner)
			.map(|ids| ids.iter().copied().map(IntentId).collect())
			.unwrap_or_default())
	}

	async fn create_intent(&self, description: &str) -> Result<TransactionHash, GatewayError> {
		let sender = self.sender().await?;
		if description.trim().is_empty() {
			return Err(revert("Description cannot be empty"));
		}

		let mut state = self.state.lock().await;
		let created_at = Self::now();
		state.intents.push(IntentRecord {
			creator: sender,
			description: description.to_string(),
			created_at,
			status: IntentStatus::Open,
			accepted_proposal: 0,
			proposals: Vec::new(),
		});
		let id = state.intents.len() as u64;
		state.user_intents.entry(sender).or_default().push(id);

		let event = emit(&IntentMarketplace::IntentCreated {
			intentId: U256::from(id),
			creator: sender,
			description: description.to_string(),
			createdAt: U256::from(created_at),
		});
		Ok(state.mine(sender, vec![event]))
	}

	async fn create_proposal(
		&self,
		intent_id: IntentId,
		amount: U256,
		message: &str,
	) -> Result<TransactionHash, GatewayError> {
		let sender = self.sender().await?;
		let mut state = self.state.lock().await;

		if state.intent(intent_id.0)?.status != IntentStatus::Open {
			return Err(revert("Intent is not open"));
		}
		if amount.is_zero() {
			return Err(revert("Amount must be greater than zero"));
		}

		let id = state.proposals.len() as u64 + 1;
		state.proposals.push(Proposal {
			id: ProposalId(id),
			intent_id,
			solver: sender,
			amount,
			message: message.to_string(),
			created_at: Self::now(),
			status: ProposalStatus::Pending,
		});
		state.intent_mut(intent_id.0)?.proposals.push(id);

		let event = emit(&IntentMarketplace::ProposalCreated {
			proposalId: U256::from(id),
			intentId: U256::from(intent_id.0),
			solver: sender,
			amount,
		});
		Ok(state.mine(sender, vec![event]))
	}

	async fn accept_proposal(
		&self,
		proposal_id: ProposalId,
		value: U256,
	) -> Result<TransactionHash, GatewayError> {
		let sender = self.sender().await?;
		let mut state = self.state.lock().await;

		let proposal = state.proposal(proposal_id.0)?.clone();
		let intent = state.intent(proposal.intent_id.0)?;
		if intent.creator != sender {
			return Err(revert("Only intent creator can accept proposals"));
		}
		if intent.status != IntentStatus::Open {
			return Err(revert("Intent is not open"));
		}
		if proposal.status != ProposalStatus::Pending {
			return Err(revert("Proposal is not pending"));
		}
		if value != proposal.amount {
			return Err(revert("Incorrect payment amount"));
		}

		let intent = state.intent_mut(proposal.intent_id.0)?;
		intent.status = IntentStatus::Completed;
		intent.accepted_proposal = proposal_id.0;
		if let Some(stored) = state.proposals.get_mut(proposal_id.0 as usize - 1) {
			stored.status = ProposalStatus::Accepted;
		}
		*state.payouts.entry(proposal.solver).or_default() += value;

		let event = emit(&IntentMarketplace::ProposalAccepted {
			proposalId: U256::from(proposal_id.0),
			intentId: U256::from(proposal.intent_id.0),
		});
		Ok(state.mine(sender, vec![event]))
	}

	async fn reject_proposal(
		&self,
		proposal_id: ProposalId,
	) -> Result<TransactionHash, GatewayError> {
		let sender = self.sender().await?;
		let mut state = self.state.lock().await;

		let proposal = state.proposal(proposal_id.0)?.clone();
		let intent = state.intent(proposal.intent_id.0)?;
		if intent.creator != sender {
			return Err(revert("Only intent creator can reject proposals"));
		}
		if intent.status != IntentStatus::Open {
			return Err(revert("Intent is not open"));
		}
		if proposal.status != ProposalStatus::Pending {
			return Err(revert("Proposal is not pending"));
		}

		if let Some(stored) = state.proposals.get_mut(proposal_id.0 as usize - 1) {
			stored.status = ProposalStatus::Rejected;
		}

		let event = emit(&IntentMarketplace::ProposalRejected {
			proposalId: U256::from(proposal_id.0),
			intentId: U256::from(proposal.intent_id.0),
		});
		Ok(state.mine(sender, vec![event]))
	}

	async fn cancel_intent(&self, intent_id: IntentId) -> Result<TransactionHash, GatewayError> {
		let sender = self.sender().await?;
		let mut state = self.state.lock().await;

		let intent = state.intent_mut(intent_id.0)?;
		if intent.creator != sender {
			return Err(revert("Only intent creator can cancel"));
		}
		if intent.status != IntentStatus::Open {
			return Err(revert("Intent is not open"));
		}
		intent.status = IntentStatus::Cancelled;

		let event = emit(&IntentMarketplace::IntentCancelled {
			intentId: U256::from(intent_id.0),
		});
		Ok(state.mine(sender, vec![event]))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, GatewayError> {
		let state = self.state.lock().await;
		state
			.receipts
			.get(&hash.0)
			.cloned()
			.ok_or_else(|| GatewayError::Call("Transaction not found".to_string()))
	}
}

/// Builds an empty [`MemoryLedger`]; takes no configuration.
pub fn create_ledger(
	_config: &toml::Value,
	wallet: Arc<WalletService>,
) -> Result<Box<dyn LedgerInterface>, GatewayError> {
	Ok(Box::new(MemoryLedger::new(wallet)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{created_intent_id, created_proposal_id, LedgerEvent};
	use novafi_wallet::implementations::local::LocalWallet;

	const CREATOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const SOLVER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

	fn wallet(key: &str) -> Arc<WalletService> {
		Arc::new(WalletService::new(Box::new(
			LocalWallet::connected(key, 31337).unwrap(),
		)))
	}

	async fn address_of(wallet: &WalletService) -> Address {
		wallet.account().await.unwrap().unwrap().address
	}

	#[tokio::test]
	async fn test_create_intent_emits_event() {
		let ledger = MemoryLedger::new(wallet(CREATOR_KEY));
		let hash = ledger.create_intent("fix my pipeline").await.unwrap();
		let receipt = ledger.wait_for_confirmation(&hash).await.unwrap();

		assert!(receipt.success);
		assert_eq!(created_intent_id(&receipt.logs), Some(IntentId(1)));

		let info = ledger.get_intent_basic_info(IntentId(1)).await.unwrap();
		assert_eq!(info.description, "fix my pipeline");
		let status = ledger.get_intent_status(IntentId(1)).await.unwrap();
		assert_eq!(status.status, IntentStatus::Open);
		assert_eq!(status.accepted_proposal_id, None);

		assert_eq!(
			ledger.get_user_intents(info.creator).await.unwrap(),
			vec![IntentId(1)]
		);
		assert_eq!(
			ledger.get_counters().await.unwrap(),
			Counters {
				total_intents: 1,
				total_proposals: 0,
			}
		);
	}

	#[tokio::test]
	async fn test_accept_requires_creator_and_exact_value() {
		let creator = MemoryLedger::new(wallet(CREATOR_KEY));
		let solver_wallet = wallet(SOLVER_KEY);
		let solver_address = address_of(&solver_wallet).await;
		let solver = creator.with_wallet(solver_wallet);

		creator.create_intent("audit contract").await.unwrap();
		let amount = U256::from(5_000_000_000_000_000u64);
		let hash = solver
			.create_proposal(IntentId(1), amount, "")
			.await
			.unwrap();
		let receipt = solver.wait_for_confirmation(&hash).await.unwrap();
		assert_eq!(created_proposal_id(&receipt.logs), Some(ProposalId(1)));

		assert!(matches!(
			solver.accept_proposal(ProposalId(1), amount).await,
			Err(GatewayError::Call(reason)) if reason.contains("Only intent creator")
		));
		assert!(matches!(
			creator.accept_proposal(ProposalId(1), amount - U256::from(1)).await,
			Err(GatewayError::Call(reason)) if reason.contains("Incorrect payment")
		));

		let hash = creator.accept_proposal(ProposalId(1), amount).await.unwrap();
		let receipt = creator.wait_for_confirmation(&hash).await.unwrap();
		assert_eq!(
			receipt.logs.iter().find_map(LedgerEvent::decode),
			Some(LedgerEvent::ProposalAccepted {
				proposal_id: ProposalId(1),
				intent_id: IntentId(1),
			})
		);

		let status = creator.get_intent_status(IntentId(1)).await.unwrap();
		assert_eq!(status.status, IntentStatus::Completed);
		assert_eq!(status.accepted_proposal_id, Some(ProposalId(1)));
		assert_eq!(creator.paid_to(solver_address).await, amount);

		assert!(solver
			.create_proposal(IntentId(1), amount, "late")
			.await
			.is_err());
	}

	#[tokio::test]
	async fn test_reject_and_cancel() {
		let creator = MemoryLedger::new(wallet(CREATOR_KEY));
		let solver = creator.with_wallet(wallet(SOLVER_KEY));

		creator.create_intent("first").await.unwrap();
		solver
			.create_proposal(IntentId(1), U256::from(10), "offer")
			.await
			.unwrap();
		creator.reject_proposal(ProposalId(1)).await.unwrap();
		assert_eq!(
			creator.get_proposal(ProposalId(1)).await.unwrap().status,
			ProposalStatus::Rejected
		);
		assert!(creator.reject_proposal(ProposalId(1)).await.is_err());

		assert!(solver.cancel_intent(IntentId(1)).await.is_err());
		creator.cancel_intent(IntentId(1)).await.unwrap();
		assert_eq!(
			creator.get_intent_status(IntentId(1)).await.unwrap().status,
			IntentStatus::Cancelled
		);
	}

	#[tokio::test]
	async fn test_missing_records_and_signer() {
		let disconnected = Arc::new(WalletService::new(Box::new(
			LocalWallet::new(CREATOR_KEY, 31337).unwrap(),
		)));
		let ledger = MemoryLedger::new(disconnected);

		assert_eq!(
			ledger.create_intent("nobody signs").await,
			Err(GatewayError::NoSigner)
		);
		assert!(ledger.get_intent_basic_info(IntentId(0)).await.is_err());
		assert!(ledger.get_proposal(ProposalId(3)).await.is_err());
		assert!(ledger
			.get_user_intents(Address::ZERO)
			.await
			.unwrap()
			.is_empty());
	}
}
