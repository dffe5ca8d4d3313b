//! Client events and the channels that carry them.
//!
//! Two channels exist. The [`EventBus`] broadcasts every session and mutation
//! event to any number of observers. The [`RefreshSignal`] is a monotonically
//! increasing counter that the presentation layer watches to know when its
//! aggregated views are stale.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::{IntentId, ProposalId, TransactionHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
	Session(SessionEvent),
	Mutation(MutationEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
	Bound {
		address: String,
		session_id: String,
	},
	Unbound {
		address: Option<String>,
	},
	BindFailed {
		address: String,
		reason: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationEvent {
	IntentCreated {
		intent_id: Option<IntentId>,
		transaction_hash: TransactionHash,
	},
	ProposalCreated {
		proposal_id: Option<ProposalId>,
		transaction_hash: TransactionHash,
	},
	Confirmed {
		kind: MutationKind,
		transaction_hash: TransactionHash,
	},
	Failed {
		kind: MutationKind,
		error: String,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
	CreateIntent,
	CreateProposal,
	AcceptProposal,
	RejectProposal,
	CancelIntent,
}

impl std::fmt::Display for MutationKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			MutationKind::CreateIntent => "create intent",
			MutationKind::CreateProposal => "create proposal",
			MutationKind::AcceptProposal => "accept proposal",
			MutationKind::RejectProposal => "reject proposal",
			MutationKind::CancelIntent => "cancel intent",
		};
		f.write_str(name)
	}
}

/// Broadcast bus for client events.
///
/// Publishing with no subscribers is not an error worth surfacing; callers
/// typically discard the result.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<MarketEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: MarketEvent,
	) -> Result<(), broadcast::error::SendError<MarketEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

/// Refresh counter bumped after every successful mutation.
#[derive(Clone)]
pub struct RefreshSignal {
	sender: watch::Sender<u64>,
}

impl Default for RefreshSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl RefreshSignal {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(0);
		Self { sender }
	}

	/// Increments the counter and wakes every watcher.
	pub fn bump(&self) -> u64 {
		self.sender.send_modify(|count| *count += 1);
		*self.sender.borrow()
	}

	pub fn current(&self) -> u64 {
		*self.sender.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.sender.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_refresh_signal_wakes_watchers() {
		let signal = RefreshSignal::new();
		let mut rx = signal.subscribe();
		assert_eq!(signal.bump(), 1);
		rx.changed().await.unwrap();
		assert_eq!(*rx.borrow(), 1);
		assert_eq!(signal.bump(), 2);
		assert_eq!(signal.current(), 2);
	}

	#[tokio::test]
	async fn test_event_bus_delivers_to_subscribers() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		bus.publish(MarketEvent::Session(SessionEvent::Unbound { address: None }))
			.unwrap();
		assert_eq!(
			rx.recv().await.unwrap(),
			MarketEvent::Session(SessionEvent::Unbound { address: None })
		);
	}
}
