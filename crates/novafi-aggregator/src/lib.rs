//! Aggregation of per-ID ledger reads into domain objects.
//!
//! The ledger only answers point lookups, so a listing is a fan-out of many
//! small reads. Fan-out runs through order-preserving buffered streams: the
//! sequence of IDs that drives a listing also fixes the order of its results,
//! no matter which read finishes first. A read that fails drops its item from
//! the listing and is logged; listings never fail as a whole.

use futures::stream::{self, StreamExt};
use novafi_ledger::{GatewayError, LedgerService};
use novafi_types::{Address, Intent, IntentId, IntentWithProposals, Proposal, ProposalId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Aggregator {
	ledger: Arc<LedgerService>,
	/// Upper bound on in-flight reads per fan-out.
	max_concurrent_fetches: usize,
}

impl Aggregator {
	pub fn new(ledger: Arc<LedgerService>, max_concurrent_fetches: usize) -> Self {
		Self {
			ledger,
			max_concurrent_fetches: max_concurrent_fetches.max(1),
		}
	}

	/// The `limit` most recent intents, newest first, whatever their status.
	pub async fn list_open_intents(&self, limit: u64) -> Vec<Intent> {
		if limit == 0 {
			return Vec::new();
		}

		let total = match self.ledger.get_counters().await {
			Ok(counters) => counters.total_intents,
			Err(e) => {
				warn!(error = %e, "Failed to read ledger counters");
				return Vec::new();
			}
		};
		if total == 0 {
			return Vec::new();
		}

		let lowest = total.saturating_sub(limit) + 1;
		debug!(total, lowest, "Listing recent intents");

		stream::iter((lowest..=total).rev().map(IntentId))
			.map(|id| async move { (id, self.get_intent(id).await) })
			.buffered(self.max_concurrent_fetches)
			.filter_map(|(id, result)| async move {
				match result {
					Ok(intent) => Some(intent),
					Err(e) => {
						warn!(intent_id = %id, error = %e, "Skipping intent");
						None
					}
				}
			})
			.collect()
			.await
	}

	/// Intents created by `owner`, each with its proposals, in ledger order.
	pub async fn list_my_intents_with_proposals(&self, owner: Address) -> Vec<IntentWithProposals> {
		let ids = match self.ledger.get_user_intents(owner).await {
			Ok(ids) => ids,
			Err(e) => {
				warn!(owner = %owner, error = %e, "Failed to read owned intents");
				return Vec::new();
			}
		};

		let mut seen = HashSet::new();
		let ids: Vec<IntentId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

		stream::iter(ids)
			.map(|id| async move { (id, self.intent_with_proposals(id).await) })
			.buffered(self.max_concurrent_fetches)
			.filter_map(|(id, result)| async move {
				match result {
					Ok(intent) => Some(intent),
					Err(e) => {
						warn!(intent_id = %id, error = %e, "Skipping owned intent");
						None
					}
				}
			})
			.collect()
			.await
	}

	/// Reads one intent. Errors are returned, not skipped.
	pub async fn get_intent(&self, id: IntentId) -> Result<Intent, GatewayError> {
		let (info, status) = tokio::try_join!(
			self.ledger.get_intent_basic_info(id),
			self.ledger.get_intent_status(id)
		)?;

		if info.id != id {
			return Err(GatewayError::Decode(format!(
				"requested intent {} but ledger returned {}",
				id, info.id
			)));
		}
		Ok(Intent::from_parts(info, status))
	}

	/// Reads one intent together with all of its proposals.
	pub async fn intent_with_proposals(
		&self,
		id: IntentId,
	) -> Result<IntentWithProposals, GatewayError> {
		let (intent, proposal_ids) =
			tokio::try_join!(self.get_intent(id), self.ledger.get_intent_proposals(id))?;

		let proposals = self.proposals_for(id, proposal_ids).await;
		if proposals.len() as u64 != intent.proposal_count {
			debug!(
				intent_id = %id,
				expected = intent.proposal_count,
				found = proposals.len(),
				"Proposal count differs from fetched proposals"
			);
		}

		Ok(IntentWithProposals { intent, proposals })
	}

	async fn proposals_for(&self, intent_id: IntentId, ids: Vec<ProposalId>) -> Vec<Proposal> {
		let mut seen = HashSet::new();
		let ids: Vec<ProposalId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

		stream::iter(ids)
			.map(|id| async move { (id, self.ledger.get_proposal(id).await) })
			.buffered(self.max_concurrent_fetches)
			.filter_map(|(id, result)| async move {
				match result {
					Ok(proposal) if proposal.intent_id == intent_id => Some(proposal),
					Ok(proposal) => {
						warn!(
							proposal_id = %id,
							intent_id = %intent_id,
							actual_intent = %proposal.intent_id,
							"Skipping proposal listed under another intent"
						);
						None
					}
					Err(e) => {
						warn!(proposal_id = %id, error = %e, "Skipping proposal");
						None
					}
				}
			})
			.collect()
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use novafi_ledger::implementations::memory::MemoryLedger;
	use novafi_ledger::LedgerInterface;
	use novafi_types::{
		ConfigSchema, Counters, IntentBasicInfo, IntentStatus, IntentStatusInfo, ProposalStatus,
		Schema, TransactionHash, TransactionReceipt, ValidationError, U256,
	};
	use novafi_wallet::implementations::local::LocalWallet;
	use novafi_wallet::WalletService;
	use std::collections::HashMap;
	use std::sync::atomic::{AtomicUsize, Ordering};

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	struct NoSchema;

	impl ConfigSchema for NoSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Read-only ledger double with scripted records and failures.
	#[derive(Default)]
	struct ScriptedLedger {
		total_intents: u64,
		counters_fail: bool,
		infos: HashMap<u64, IntentBasicInfo>,
		statuses: HashMap<u64, IntentStatusInfo>,
		intent_proposals: HashMap<u64, Vec<ProposalId>>,
		proposals: HashMap<u64, Proposal>,
		owned: Vec<IntentId>,
		info_reads: Arc<AtomicUsize>,
	}

	impl ScriptedLedger {
		fn with_intents(total: u64) -> Self {
			let mut ledger = ScriptedLedger {
				total_intents: total,
				..Default::default()
			};
			for id in 1..=total {
				ledger.add_intent(id, &format!("intent {}", id));
			}
			ledger
		}

		fn add_intent(&mut self, id: u64, description: &str) {
			self.infos.insert(
				id,
				IntentBasicInfo {
					id: IntentId(id),
					creator: Address::repeat_byte(0x01),
					description: description.to_string(),
					created_at: 1_700_000_000 + id,
				},
			);
			self.statuses.insert(
				id,
				IntentStatusInfo {
					status: IntentStatus::Open,
					accepted_proposal_id: None,
					proposal_count: 0,
				},
			);
		}

		fn add_proposal(&mut self, id: u64, intent_id: u64, listed_under: u64) {
			self.proposals.insert(
				id,
				Proposal {
					id: ProposalId(id),
					intent_id: IntentId(intent_id),
					solver: Address::repeat_byte(0x02),
					amount: U256::from(id * 1000),
					message: String::new(),
					created_at: 1_700_000_100,
					status: ProposalStatus::Pending,
				},
			);
			self.intent_proposals
				.entry(listed_under)
				.or_default()
				.push(ProposalId(id));
			if let Some(status) = self.statuses.get_mut(&listed_under) {
				status.proposal_count += 1;
			}
		}
	}

	fn missing(what: &str) -> GatewayError {
		GatewayError::Call(format!("execution reverted: {} does not exist", what))
	}

	fn read_only() -> GatewayError {
		GatewayError::Call("read-only double".to_string())
	}

	#[async_trait]
	impl LedgerInterface for ScriptedLedger {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoSchema)
		}

		async fn get_counters(&self) -> Result<Counters, GatewayError> {
			if self.counters_fail {
				return Err(GatewayError::Call("connection refused".to_string()));
			}
			Ok(Counters {
				total_intents: self.total_intents,
				total_proposals: self.proposals.len() as u64,
			})
		}

		async fn get_intent_basic_info(
			&self,
			id: IntentId,
		) -> Result<IntentBasicInfo, GatewayError> {
			self.info_reads.fetch_add(1, Ordering::SeqCst);
			self.infos.get(&id.0).cloned().ok_or_else(|| missing("Intent"))
		}

		async fn get_intent_status(&self, id: IntentId) -> Result<IntentStatusInfo, GatewayError> {
			self.statuses.get(&id.0).cloned().ok_or_else(|| missing("Intent"))
		}

		async fn get_intent_proposals(
			&self,
			id: IntentId,
		) -> Result<Vec<ProposalId>, GatewayError> {
			Ok(self.intent_proposals.get(&id.0).cloned().unwrap_or_default())
		}

		async fn get_proposal(&self, id: ProposalId) -> Result<Proposal, GatewayError> {
			self.proposals.get(&id.0).cloned().ok_or_else(|| missing("Proposal"))
		}

		async fn get_user_intents(&self, _owner: Address) -> Result<Vec<IntentId>, GatewayError> {
			Ok(self.owned.clone())
		}

		async fn create_intent(&self, _description: &str) -> Result<TransactionHash, GatewayError> {
			Err(read_only())
		}

		async fn create_proposal(
			&self,
			_intent_id: IntentId,
			_amount: U256,
			_message: &str,
		) -> Result<TransactionHash, GatewayError> {
			Err(read_only())
		}

		async fn accept_proposal(
			&self,
			_proposal_id: ProposalId,
			_value: U256,
		) -> Result<TransactionHash, GatewayError> {
			Err(read_only())
		}

		async fn reject_proposal(
			&self,
			_proposal_id: ProposalId,
		) -> Result<TransactionHash, GatewayError> {
			Err(read_only())
		}

		async fn cancel_intent(&self, _intent_id: IntentId) -> Result<TransactionHash, GatewayError> {
			Err(read_only())
		}

		async fn wait_for_confirmation(
			&self,
			_hash: &TransactionHash,
		) -> Result<TransactionReceipt, GatewayError> {
			Err(read_only())
		}
	}

	fn build(ledger: ScriptedLedger) -> Aggregator {
		Aggregator::new(Arc::new(LedgerService::new(Box::new(ledger))), 4)
	}

	fn ids(intents: &[Intent]) -> Vec<u64> {
		intents.iter().map(|intent| intent.id.0).collect()
	}

	#[tokio::test]
	async fn test_recent_intents_newest_first() {
		let aggregator = build(ScriptedLedger::with_intents(10));

		assert_eq!(ids(&aggregator.list_open_intents(3).await), vec![10, 9, 8]);
		assert_eq!(ids(&aggregator.list_open_intents(50).await).len(), 10);
		assert_eq!(ids(&aggregator.list_open_intents(50).await)[9], 1);
	}

	#[tokio::test]
	async fn test_zero_limit_and_empty_ledger() {
		let aggregator = build(ScriptedLedger::with_intents(5));
		assert!(aggregator.list_open_intents(0).await.is_empty());

		assert!(build(ScriptedLedger::default())
			.list_open_intents(10)
			.await
			.is_empty());
	}

	#[tokio::test]
	async fn test_counter_failure_yields_empty() {
		let aggregator = build(ScriptedLedger {
			counters_fail: true,
			..Default::default()
		});
		assert!(aggregator.list_open_intents(0).await.is_empty());
		assert!(aggregator.list_open_intents(5).await.is_empty());
	}

	#[tokio::test]
	async fn test_failed_reads_are_skipped() {
		let mut ledger = ScriptedLedger::with_intents(6);
		ledger.infos.remove(&5);
		ledger.statuses.remove(&2);
		// A record that answers for a different ID is inconsistent.
		if let Some(info) = ledger.infos.get_mut(&4) {
			info.id = IntentId(40);
		}

		let aggregator = build(ledger);
		assert_eq!(ids(&aggregator.list_open_intents(10).await), vec![6, 3, 1]);
		assert!(aggregator.get_intent(IntentId(5)).await.is_err());
		assert!(matches!(
			aggregator.get_intent(IntentId(4)).await,
			Err(GatewayError::Decode(_))
		));
	}

	#[tokio::test]
	async fn test_owned_intents_deduplicated_with_proposals() {
		let mut ledger = ScriptedLedger::with_intents(4);
		ledger.owned = vec![IntentId(2), IntentId(4), IntentId(2), IntentId(9)];
		ledger.add_proposal(1, 2, 2);
		ledger.add_proposal(2, 4, 4);
		ledger.add_proposal(3, 2, 2);
		// Listed under intent 4 but belongs to intent 3.
		ledger.add_proposal(4, 3, 4);

		let aggregator = build(ledger);
		let mine = aggregator
			.list_my_intents_with_proposals(Address::repeat_byte(0x01))
			.await;

		let owned: Vec<u64> = mine.iter().map(|entry| entry.intent.id.0).collect();
		assert_eq!(owned, vec![2, 4]);

		let nested: Vec<Vec<u64>> = mine
			.iter()
			.map(|entry| entry.proposals.iter().map(|p| p.id.0).collect())
			.collect();
		assert_eq!(nested, vec![vec![1, 3], vec![2]]);
		assert!(mine
			.iter()
			.all(|entry| entry.proposals.iter().all(|p| p.intent_id == entry.intent.id)));
	}

	#[tokio::test]
	async fn test_repeated_proposal_id_nested_once() {
		let mut ledger = ScriptedLedger::with_intents(1);
		ledger.owned = vec![IntentId(1)];
		ledger.add_proposal(5, 1, 1);
		ledger.add_proposal(6, 1, 1);
		ledger
			.intent_proposals
			.entry(1)
			.or_default()
			.push(ProposalId(5));

		let mine = build(ledger)
			.list_my_intents_with_proposals(Address::repeat_byte(0x01))
			.await;
		let nested: Vec<u64> = mine[0].proposals.iter().map(|p| p.id.0).collect();
		assert_eq!(nested, vec![5, 6]);
	}

	#[tokio::test]
	async fn test_duplicate_owned_id_read_once() {
		let mut ledger = ScriptedLedger::with_intents(1);
		ledger.owned = vec![IntentId(1), IntentId(1), IntentId(1)];
		let info_reads = ledger.info_reads.clone();

		let mine = build(ledger)
			.list_my_intents_with_proposals(Address::repeat_byte(0x01))
			.await;
		assert_eq!(mine.len(), 1);
		assert_eq!(info_reads.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_against_memory_ledger() {
		let wallet = Arc::new(WalletService::new(Box::new(
			LocalWallet::connected(KEY, 31337).unwrap(),
		)));
		let owner = wallet.account().await.unwrap().unwrap().address;
		let ledger = MemoryLedger::new(wallet);

		for description in ["first", "second", "third"] {
			ledger.create_intent(description).await.unwrap();
		}
		ledger
			.create_proposal(IntentId(2), U256::from(7), "cheap")
			.await
			.unwrap();
		ledger.cancel_intent(IntentId(3)).await.unwrap();

		let aggregator = Aggregator::new(Arc::new(LedgerService::new(Box::new(ledger))), 8);
		let recent = aggregator.list_open_intents(2).await;
		assert_eq!(ids(&recent), vec![3, 2]);
		assert_eq!(recent[0].status, IntentStatus::Cancelled);

		let mine = aggregator.list_my_intents_with_proposals(owner).await;
		assert_eq!(mine.len(), 3);
		assert_eq!(mine[1].proposals.len(), 1);
		assert_eq!(mine[1].proposals[0].message(), Some("cheap"));
		assert!(aggregator
			.list_my_intents_with_proposals(Address::ZERO)
			.await
			.is_empty());
	}
}
