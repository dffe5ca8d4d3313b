//! Subcommand handlers. Each one prints its result to stdout.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use novafi_core::MarketplaceClient;
use novafi_mutation::MutationOutcome;
use novafi_types::{
	format_amount, format_relative_time, parse_amount, short_address, Intent, IntentId,
	MarketEvent, MutationEvent, ProposalId, SessionEvent, SessionState,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tracing::{info, warn};

pub async fn browse(client: &MarketplaceClient, limit: Option<u64>) -> Result<()> {
	let intents = client.browse(limit).await;
	if intents.is_empty() {
		println!("No intents yet.");
		return Ok(());
	}
	for intent in &intents {
		print_intent(intent);
	}
	Ok(())
}

pub async fn mine(client: &MarketplaceClient) -> Result<()> {
	connect(client).await?;
	let intents = client.my_intents().await?;
	if intents.is_empty() {
		println!("You have not posted any intents.");
		return Ok(());
	}

	for entry in &intents {
		print_intent(&entry.intent);
		if entry.proposals.is_empty() {
			println!("    no proposals");
		}
		for proposal in &entry.proposals {
			println!(
				"    proposal #{} from {}: {} [{}]",
				proposal.id,
				short_address(&proposal.solver.to_string()),
				format_amount(proposal.amount),
				proposal.status
			);
			if let Some(message) = proposal.message() {
				println!("      \"{}\"", message);
			}
		}
	}
	Ok(())
}

pub async fn create_intent(client: &MarketplaceClient, description: &str) -> Result<()> {
	connect(client).await?;
	let outcome = client.mutations().create_intent(description).await;
	report(outcome)
}

pub async fn propose(
	client: &MarketplaceClient,
	intent_id: IntentId,
	amount: &str,
	message: &str,
) -> Result<()> {
	let amount = parse_amount(amount).with_context(|| format!("Invalid amount '{}'", amount))?;
	connect(client).await?;
	let outcome = client
		.mutations()
		.create_proposal(intent_id, amount, message)
		.await;
	report(outcome)
}

pub async fn accept(client: &MarketplaceClient, proposal_id: ProposalId) -> Result<()> {
	connect(client).await?;
	let outcome = client
		.mutations()
		.accept_proposal(proposal_id)
		.await;
	report(outcome)
}

pub async fn reject(client: &MarketplaceClient, proposal_id: ProposalId) -> Result<()> {
	connect(client).await?;
	let outcome = client
		.mutations()
		.reject_proposal(proposal_id)
		.await;
	report(outcome)
}

pub async fn cancel(client: &MarketplaceClient, intent_id: IntentId) -> Result<()> {
	connect(client).await?;
	let outcome = client.mutations().cancel_intent(intent_id).await;
	report(outcome)
}

/// Runs the session binder and prints session changes and marketplace events
/// until Ctrl+C. The listing is reloaded each time a session binds.
pub async fn watch(client: MarketplaceClient) -> Result<()> {
	let client = Arc::new(client);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	let binder_handle = {
		let client = client.clone();
		tokio::spawn(async move { client.run_session(shutdown_rx).await })
	};

	let mut states = WatchStream::from_changes(client.binder().subscribe());
	let mut events = BroadcastStream::new(client.event_bus().subscribe());

	info!("Watching marketplace, press Ctrl+C to stop");

	loop {
		tokio::select! {
			Some(state) = states.next() => print_state(&state),
			Some(event) = events.next() => match event {
				Ok(event) if relists_after(&event) => {
					let intents = client.browse(None).await;
					println!("{} intents listed", intents.len());
				}
				Ok(event) => print_event(&event),
				Err(e) => warn!(error = %e, "Event stream lagged"),
			},
			result = signal::ctrl_c() => {
				if let Err(e) = result {
					warn!(error = %e, "Failed to listen for Ctrl+C");
				}
				break;
			}
		}
	}

	info!("Shutdown signal received, stopping session binder");
	let _ = shutdown_tx.send(true);
	binder_handle
		.await
		.context("Session binder task failed")?;
	Ok(())
}

/// Events after which `watch` reloads the listing.
fn relists_after(event: &MarketEvent) -> bool {
	matches!(event, MarketEvent::Session(SessionEvent::Bound { .. }))
}

async fn connect(client: &MarketplaceClient) -> Result<()> {
	let state = client.connect().await?;
	match state.session() {
		Some(session) => {
			info!(
				address = %session.display_address,
				chain_id = session.chain_id,
				"Wallet session ready"
			);
			Ok(())
		}
		None => bail!("Wallet session could not be established"),
	}
}

fn report(outcome: MutationOutcome) -> Result<()> {
	match outcome {
		MutationOutcome::Success(receipt) => {
			println!(
				"{} confirmed in block {} ({})",
				receipt.kind,
				receipt.receipt.block_number,
				receipt.transaction_hash()
			);
			if let Some(id) = receipt.intent_id {
				println!("intent #{}", id);
			}
			if let Some(id) = receipt.proposal_id {
				println!("proposal #{}", id);
			}
			Ok(())
		}
		MutationOutcome::Failure { error } => Err(anyhow!(error)),
	}
}

fn print_intent(intent: &Intent) {
	println!(
		"#{} [{}] {} by {}, {}, {} proposal(s)",
		intent.id,
		intent.status,
		intent.description,
		short_address(&intent.creator.to_string()),
		format_relative_time(intent.created_at, Utc::now()),
		intent.proposal_count
	);
}

fn print_state(state: &SessionState) {
	match state {
		SessionState::Disconnected => println!("wallet disconnected"),
		SessionState::Connecting { address, chain_id } => {
			println!("wallet {} on chain {}, signing in", address, chain_id)
		}
		SessionState::Connected(session) => println!(
			"signed in as {} on chain {}",
			short_address(&session.display_address),
			session.chain_id
		),
	}
}

fn print_event(event: &MarketEvent) {
	match event {
		MarketEvent::Session(SessionEvent::BindFailed { address, reason }) => {
			println!("sign-in failed for {}: {}", short_address(address), reason)
		}
		MarketEvent::Mutation(MutationEvent::Failed { kind, error }) => {
			println!("{} failed: {}", kind, error)
		}
		MarketEvent::Mutation(MutationEvent::Confirmed {
			kind,
			transaction_hash,
		}) => println!("{} confirmed ({})", kind, transaction_hash.truncated()),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_relists_only_after_bind() {
		let bound = MarketEvent::Session(SessionEvent::Bound {
			address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
			session_id: "user-1".to_string(),
		});
		let unbound = MarketEvent::Session(SessionEvent::Unbound { address: None });
		let failed = MarketEvent::Session(SessionEvent::BindFailed {
			address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
			reason: "Registration failed".to_string(),
		});

		assert!(relists_after(&bound));
		assert!(!relists_after(&unbound));
		assert!(!relists_after(&failed));
	}
}
