//! Decoding of marketplace contract events from receipt logs.

use crate::contract::IntentMarketplace;
use alloy::primitives::{Address, Log, U256};
use alloy::sol_types::SolEvent;
use novafi_types::{IntentId, ProposalId};

/// A decoded marketplace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
	IntentCreated {
		intent_id: IntentId,
		creator: Address,
		description: String,
	},
	ProposalCreated {
		proposal_id: ProposalId,
		intent_id: IntentId,
		solver: Address,
		amount: U256,
	},
	ProposalAccepted {
		proposal_id: ProposalId,
		intent_id: IntentId,
	},
	ProposalRejected {
		proposal_id: ProposalId,
		intent_id: IntentId,
	},
	IntentCancelled {
		intent_id: IntentId,
	},
}

impl LedgerEvent {
	/// Decodes a log against every known event, returning the first match.
	///
	/// Matching is by event signature only; the emitting address is not
	/// checked, so callers pass logs from receipts of their own contract
	/// calls. Unknown events and IDs that do not fit in 64 bits yield `None`.
	pub fn decode(log: &Log) -> Option<Self> {
		let data = &log.data;

		if let Ok(event) = IntentMarketplace::IntentCreated::decode_log_data(data) {
			return Some(LedgerEvent::IntentCreated {
				intent_id: IntentId(id(event.intentId)?),
				creator: event.creator,
				description: event.description,
			});
		}
		if let Ok(event) = IntentMarketplace::ProposalCreated::decode_log_data(data) {
			return Some(LedgerEvent::ProposalCreated {
				proposal_id: ProposalId(id(event.proposalId)?),
				intent_id: IntentId(id(event.intentId)?),
				solver: event.solver,
				amount: event.amount,
			});
		}
		if let Ok(event) = IntentMarketplace::ProposalAccepted::decode_log_data(data) {
			return Some(LedgerEvent::ProposalAccepted {
				proposal_id: ProposalId(id(event.proposalId)?),
				intent_id: IntentId(id(event.intentId)?),
			});
		}
		if let Ok(event) = IntentMarketplace::ProposalRejected::decode_log_data(data) {
			return Some(LedgerEvent::ProposalRejected {
				proposal_id: ProposalId(id(event.proposalId)?),
				intent_id: IntentId(id(event.intentId)?),
			});
		}
		if let Ok(event) = IntentMarketplace::IntentCancelled::decode_log_data(data) {
			return Some(LedgerEvent::IntentCancelled {
				intent_id: IntentId(id(event.intentId)?),
			});
		}
		None
	}
}

fn id(value: U256) -> Option<u64> {
	u64::try_from(value).ok()
}

/// ID of the first `IntentCreated` event among `logs`.
pub fn created_intent_id(logs: &[Log]) -> Option<IntentId> {
	logs.iter()
		.filter_map(LedgerEvent::decode)
		.find_map(|event| match event {
			LedgerEvent::IntentCreated { intent_id, .. } => Some(intent_id),
			_ => None,
		})
}

/// ID of the first `ProposalCreated` event among `logs`.
pub fn created_proposal_id(logs: &[Log]) -> Option<ProposalId> {
	logs.iter()
		.filter_map(LedgerEvent::decode)
		.find_map(|event| match event {
			LedgerEvent::ProposalCreated { proposal_id, .. } => Some(proposal_id),
			_ => None,
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Bytes, LogData, B256};

	fn log_of(event: &impl SolEvent) -> Log {
		Log {
			address: Address::repeat_byte(0x11),
			data: event.encode_log_data(),
		}
	}

	#[test]
	fn test_decodes_each_event() {
		let creator = Address::repeat_byte(0x22);
		let created = log_of(&IntentMarketplace::IntentCreated {
			intentId: U256::from(7),
			creator,
			description: "fix my pipeline".to_string(),
			createdAt: U256::from(1_700_000_000u64),
		});
		assert_eq!(
			LedgerEvent::decode(&created),
			Some(LedgerEvent::IntentCreated {
				intent_id: IntentId(7),
				creator,
				description: "fix my pipeline".to_string(),
			})
		);

		let accepted = log_of(&IntentMarketplace::ProposalAccepted {
			proposalId: U256::from(20),
			intentId: U256::from(7),
		});
		let rejected = log_of(&IntentMarketplace::ProposalRejected {
			proposalId: U256::from(21),
			intentId: U256::from(7),
		});
		assert_eq!(
			LedgerEvent::decode(&accepted),
			Some(LedgerEvent::ProposalAccepted {
				proposal_id: ProposalId(20),
				intent_id: IntentId(7),
			})
		);
		assert_eq!(
			LedgerEvent::decode(&rejected),
			Some(LedgerEvent::ProposalRejected {
				proposal_id: ProposalId(21),
				intent_id: IntentId(7),
			})
		);
	}

	#[test]
	fn test_unrelated_logs_are_ignored() {
		let transfer = Log {
			address: Address::repeat_byte(0x33),
			data: LogData::new_unchecked(
				vec![B256::repeat_byte(0xdd), B256::ZERO, B256::ZERO],
				Bytes::from(vec![0u8; 32]),
			),
		};
		assert_eq!(LedgerEvent::decode(&transfer), None);

		let proposal = log_of(&IntentMarketplace::ProposalCreated {
			proposalId: U256::from(3),
			intentId: U256::from(1),
			solver: Address::repeat_byte(0x44),
			amount: U256::from(10),
		});
		let logs = vec![transfer, proposal];
		assert_eq!(created_intent_id(&logs), None);
		assert_eq!(created_proposal_id(&logs), Some(ProposalId(3)));
	}

	#[test]
	fn test_decoding_matches_signature_not_emitter() {
		let event = IntentMarketplace::IntentCreated {
			intentId: U256::from(9),
			creator: Address::repeat_byte(0x22),
			description: "mirror".to_string(),
			createdAt: U256::from(1_700_000_000u64),
		};
		let foreign = Log {
			address: Address::repeat_byte(0x99),
			data: event.encode_log_data(),
		};
		assert_eq!(created_intent_id(&[foreign]), Some(IntentId(9)));
	}

	#[test]
	fn test_oversized_id_is_not_decoded() {
		let cancelled = log_of(&IntentMarketplace::IntentCancelled {
			intentId: U256::MAX,
		});
		assert_eq!(LedgerEvent::decode(&cancelled), None);
	}
}
