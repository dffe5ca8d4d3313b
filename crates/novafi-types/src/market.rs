//! Marketplace domain types.
//!
//! Intents and proposals are immutable snapshots of ledger state. They are
//! decoded once at the ledger boundary and never mutated locally; a fresh
//! read is the only way to observe a transition.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ledger-assigned intent identifier. Assigned monotonically starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(pub u64);

/// Ledger-assigned proposal identifier, unique across all intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub u64);

impl fmt::Display for IntentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for ProposalId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for IntentId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.trim().parse().map(IntentId)
	}
}

impl FromStr for ProposalId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.trim().parse().map(ProposalId)
	}
}

/// Raised when the ledger reports a status code outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status code {code}")]
pub struct UnknownStatusCode {
	pub kind: &'static str,
	pub code: u8,
}

/// Lifecycle state of an intent. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentStatus {
	Open,
	Completed,
	Cancelled,
}

impl IntentStatus {
	pub fn code(self) -> u8 {
		match self {
			IntentStatus::Open => 0,
			IntentStatus::Completed => 1,
			IntentStatus::Cancelled => 2,
		}
	}
}

impl TryFrom<u8> for IntentStatus {
	type Error = UnknownStatusCode;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		match code {
			0 => Ok(IntentStatus::Open),
			1 => Ok(IntentStatus::Completed),
			2 => Ok(IntentStatus::Cancelled),
			_ => Err(UnknownStatusCode {
				kind: "intent",
				code,
			}),
		}
	}
}

impl fmt::Display for IntentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			IntentStatus::Open => "Open",
			IntentStatus::Completed => "Completed",
			IntentStatus::Cancelled => "Cancelled",
		};
		f.write_str(label)
	}
}

/// Lifecycle state of a proposal. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
	Pending,
	Accepted,
	Rejected,
}

impl ProposalStatus {
	pub fn code(self) -> u8 {
		match self {
			ProposalStatus::Pending => 0,
			ProposalStatus::Accepted => 1,
			ProposalStatus::Rejected => 2,
		}
	}
}

impl TryFrom<u8> for ProposalStatus {
	type Error = UnknownStatusCode;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		match code {
			0 => Ok(ProposalStatus::Pending),
			1 => Ok(ProposalStatus::Accepted),
			2 => Ok(ProposalStatus::Rejected),
			_ => Err(UnknownStatusCode {
				kind: "proposal",
				code,
			}),
		}
	}
}

impl fmt::Display for ProposalStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			ProposalStatus::Pending => "Pending",
			ProposalStatus::Accepted => "Accepted",
			ProposalStatus::Rejected => "Rejected",
		};
		f.write_str(label)
	}
}

/// Global ledger counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
	pub total_intents: u64,
	pub total_proposals: u64,
}

/// Result of `getIntentBasicInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentBasicInfo {
	pub id: IntentId,
	pub creator: Address,
	pub description: String,
	/// Block time in seconds since the epoch.
	pub created_at: u64,
}

/// Result of `getIntentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStatusInfo {
	pub status: IntentStatus,
	/// `None` when the ledger reports the zero sentinel.
	pub accepted_proposal_id: Option<ProposalId>,
	pub proposal_count: u64,
}

/// A unit of work posted by a creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
	pub id: IntentId,
	pub creator: Address,
	pub description: String,
	pub created_at: u64,
	pub status: IntentStatus,
	pub accepted_proposal_id: Option<ProposalId>,
	pub proposal_count: u64,
}

impl Intent {
	/// Joins the two halves the ledger serves separately.
	pub fn from_parts(info: IntentBasicInfo, status: IntentStatusInfo) -> Self {
		Self {
			id: info.id,
			creator: info.creator,
			description: info.description,
			created_at: info.created_at,
			status: status.status,
			accepted_proposal_id: status.accepted_proposal_id,
			proposal_count: status.proposal_count,
		}
	}

	pub fn is_open(&self) -> bool {
		self.status == IntentStatus::Open
	}
}

/// A solver's bid against an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
	pub id: ProposalId,
	pub intent_id: IntentId,
	pub solver: Address,
	/// Amount in wei.
	pub amount: U256,
	/// Empty when the solver left no message.
	pub message: String,
	pub created_at: u64,
	pub status: ProposalStatus,
}

impl Proposal {
	pub fn message(&self) -> Option<&str> {
		if self.message.is_empty() {
			None
		} else {
			Some(&self.message)
		}
	}

	pub fn is_pending(&self) -> bool {
		self.status == ProposalStatus::Pending
	}
}

/// An intent together with its proposals, in ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentWithProposals {
	#[serde(flatten)]
	pub intent: Intent,
	pub proposals: Vec<Proposal>,
}
