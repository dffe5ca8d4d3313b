//! State-changing marketplace operations.
//!
//! Each operation checks the current ledger state, submits one transaction,
//! waits for it to be mined and reports a [`MutationOutcome`]. Errors never
//! escape as `Err`: a refused pre-check, a rejected submission and a reverted
//! receipt all become [`MutationOutcome::Failure`] carrying the message the
//! user should see. Successful operations bump the refresh signal so that
//! listings are re-read.

use novafi_aggregator::Aggregator;
use novafi_ledger::{created_intent_id, created_proposal_id, GatewayError, LedgerService};
use novafi_types::{
	EventBus, IntentId, MarketEvent, MutationEvent, MutationKind, Proposal, ProposalId,
	RefreshSignal, TransactionHash, TransactionReceipt, U256,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// A confirmed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
	pub kind: MutationKind,
	pub receipt: TransactionReceipt,
	/// ID of the created intent, when the receipt carries one.
	pub intent_id: Option<IntentId>,
	/// ID of the created proposal, when the receipt carries one.
	pub proposal_id: Option<ProposalId>,
}

impl MutationReceipt {
	pub fn transaction_hash(&self) -> TransactionHash {
		self.receipt.hash
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
	Success(MutationReceipt),
	Failure { error: String },
}

impl MutationOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, MutationOutcome::Success(_))
	}

	pub fn receipt(&self) -> Option<&MutationReceipt> {
		match self {
			MutationOutcome::Success(receipt) => Some(receipt),
			MutationOutcome::Failure { .. } => None,
		}
	}

	pub fn error(&self) -> Option<&str> {
		match self {
			MutationOutcome::Success(_) => None,
			MutationOutcome::Failure { error } => Some(error),
		}
	}
}

pub struct MutationFacade {
	ledger: Arc<LedgerService>,
	aggregator: Arc<Aggregator>,
	refresh: RefreshSignal,
	event_bus: EventBus,
}

impl MutationFacade {
	pub fn new(
		ledger: Arc<LedgerService>,
		aggregator: Arc<Aggregator>,
		refresh: RefreshSignal,
		event_bus: EventBus,
	) -> Self {
		Self {
			ledger,
			aggregator,
			refresh,
			event_bus,
		}
	}

	pub async fn create_intent(&self, description: &str) -> MutationOutcome {
		let kind = MutationKind::CreateIntent;
		let description = description.trim();
		if description.is_empty() {
			return self.refuse(kind, "Description cannot be empty");
		}

		self.execute(kind, self.ledger.create_intent(description)).await
	}

	pub async fn create_proposal(
		&self,
		intent_id: IntentId,
		amount: U256,
		message: &str,
	) -> MutationOutcome {
		let kind = MutationKind::CreateProposal;
		if amount.is_zero() {
			return self.refuse(kind, "Amount must be greater than zero");
		}
		if let Err(reason) = self.require_open_intent(intent_id).await {
			return self.refuse(kind, &reason);
		}

		self.execute(kind, self.ledger.create_proposal(intent_id, amount, message.trim()))
			.await
	}

	/// Accepts a proposal, paying exactly the amount the ledger recorded for it.
	pub async fn accept_proposal(&self, proposal_id: ProposalId) -> MutationOutcome {
		let kind = MutationKind::AcceptProposal;
		let proposal = match self.require_actionable_proposal(proposal_id).await {
			Ok(proposal) => proposal,
			Err(reason) => return self.refuse(kind, &reason),
		};

		self.execute(kind, self.ledger.accept_proposal(proposal_id, proposal.amount))
			.await
	}

	pub async fn reject_proposal(&self, proposal_id: ProposalId) -> MutationOutcome {
		let kind = MutationKind::RejectProposal;
		if let Err(reason) = self.require_actionable_proposal(proposal_id).await {
			return self.refuse(kind, &reason);
		}

		self.execute(kind, self.ledger.reject_proposal(proposal_id)).await
	}

	pub async fn cancel_intent(&self, intent_id: IntentId) -> MutationOutcome {
		let kind = MutationKind::CancelIntent;
		if let Err(reason) = self.require_open_intent(intent_id).await {
			return self.refuse(kind, &reason);
		}

		self.execute(kind, self.ledger.cancel_intent(intent_id)).await
	}

	async fn require_open_intent(&self, intent_id: IntentId) -> Result<(), String> {
		let intent = self
			.aggregator
			.get_intent(intent_id)
			.await
			.map_err(|e| e.to_string())?;
		if !intent.is_open() {
			return Err(format!("Intent #{} is {}", intent_id, intent.status));
		}
		Ok(())
	}

	/// The proposal, if it is pending and its intent still open.
	async fn require_actionable_proposal(&self, proposal_id: ProposalId) -> Result<Proposal, String> {
		let proposal = self
			.ledger
			.get_proposal(proposal_id)
			.await
			.map_err(|e| e.to_string())?;
		if !proposal.is_pending() {
			return Err(format!("Proposal #{} is {}", proposal_id, proposal.status));
		}
		self.require_open_intent(proposal.intent_id).await?;
		Ok(proposal)
	}

	async fn execute<F>(&self, kind: MutationKind, submission: F) -> MutationOutcome
	where
		F: Future<Output = Result<TransactionHash, GatewayError>>,
	{
		let hash = match submission.await {
			Ok(hash) => hash,
			Err(e) => return self.fail(kind, e.to_string()),
		};

		let receipt = match self.ledger.wait_for_confirmation(&hash).await {
			Ok(receipt) => receipt,
			Err(e) => return self.fail(kind, e.to_string()),
		};
		if !receipt.success {
			return self.fail(kind, "Transaction reverted".to_string());
		}

		let (intent_id, proposal_id) = match kind {
			MutationKind::CreateIntent => (created_intent_id(&receipt.logs), None),
			MutationKind::CreateProposal => (None, created_proposal_id(&receipt.logs)),
			_ => (None, None),
		};

		let event = match kind {
			MutationKind::CreateIntent => MutationEvent::IntentCreated {
				intent_id,
				transaction_hash: hash,
			},
			MutationKind::CreateProposal => MutationEvent::ProposalCreated {
				proposal_id,
				transaction_hash: hash,
			},
			_ => MutationEvent::Confirmed {
				kind,
				transaction_hash: hash,
			},
		};
		let _ = self.event_bus.publish(MarketEvent::Mutation(event));
		let generation = self.refresh.bump();

		info!(
			tx_hash = %hash.truncated(),
			refresh = generation,
			"{} confirmed",
			kind
		);

		MutationOutcome::Success(MutationReceipt {
			kind,
			receipt,
			intent_id,
			proposal_id,
		})
	}

	fn refuse(&self, kind: MutationKind, reason: &str) -> MutationOutcome {
		info!(%kind, reason, "Mutation refused before submission");
		self.outcome_failure(kind, reason.to_string())
	}

	fn fail(&self, kind: MutationKind, error: String) -> MutationOutcome {
		error!(%kind, error = %error, "Mutation failed");
		self.outcome_failure(kind, error)
	}

	fn outcome_failure(&self, kind: MutationKind, error: String) -> MutationOutcome {
		let _ = self
			.event_bus
			.publish(MarketEvent::Mutation(MutationEvent::Failed {
				kind,
				error: error.clone(),
			}));
		MutationOutcome::Failure { error }
	}
}
