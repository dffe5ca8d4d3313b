use novafi_config::Config;
use novafi_core::{ClientBuilder, ClientError, MarketplaceClient};
use novafi_identity::implementations::memory;
use novafi_ledger::implementations::memory::MemoryLedger;
use novafi_ledger::LedgerInterface;
use novafi_types::{
	parse_amount, IntentStatus, MarketEvent, MutationEvent, ProposalStatus, SessionEvent,
	SessionState,
};
use novafi_wallet::implementations::local::{self, LocalWallet};
use novafi_wallet::WalletService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

const CREATOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const SOLVER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

fn config(private_key: &str, auto_connect: bool) -> Config {
	let raw = format!(
		r#"
[app]
name = "novafi-test"

[session]
poll_interval_ms = 10

[wallet]
provider = "local"
[wallet.config]
private_key = "{private_key}"
chain_id = 31337
auto_connect = {auto_connect}

[ledger]
provider = "memory"

[identity]
provider = "memory"
"#
	);
	toml::from_str(&raw).unwrap()
}

fn shared_ledger() -> MemoryLedger {
	let wallet = LocalWallet::new(CREATOR_KEY, 31337).unwrap();
	MemoryLedger::new(Arc::new(WalletService::new(Box::new(wallet))))
}

fn client(config: Config, ledger: &MemoryLedger) -> Result<MarketplaceClient, ClientError> {
	let ledger = ledger.clone();
	ClientBuilder::new(config)
		.with_wallet_factory("local", local::create_wallet)
		.with_ledger_factory("memory", move |_config, wallet| {
			Ok(Box::new(ledger.with_wallet(wallet)) as Box<dyn LedgerInterface>)
		})
		.with_identity_factory("memory", memory::create_identity)
		.build()
}

#[tokio::test]
async fn test_intent_lifecycle_between_two_clients() {
	let ledger = shared_ledger();
	let creator = client(config(CREATOR_KEY, false), &ledger).unwrap();
	let solver = client(config(SOLVER_KEY, false), &ledger).unwrap();

	assert!(creator.connect().await.unwrap().session().is_some());
	assert!(solver.connect().await.unwrap().session().is_some());

	let created = creator.mutations().create_intent("  Bridge 1 ETH to Base  ").await;
	let intent_id = created.receipt().and_then(|r| r.intent_id).unwrap();

	let browse = solver.browse(None).await;
	assert_eq!(browse.len(), 1);
	assert_eq!(browse[0].description, "Bridge 1 ETH to Base");

	let amount = parse_amount("0.25").unwrap();
	let proposed = solver
		.mutations()
		.create_proposal(intent_id, amount, "Done within the hour")
		.await;
	let proposal_id = proposed.receipt().and_then(|r| r.proposal_id).unwrap();

	let counters = creator.ledger().get_counters().await.unwrap();
	assert_eq!(counters.total_intents, 1);
	assert_eq!(counters.total_proposals, 1);

	let mine = creator.my_intents().await.unwrap();
	assert_eq!(mine.len(), 1);
	assert_eq!(mine[0].proposals.len(), 1);
	assert_eq!(mine[0].proposals[0].status, ProposalStatus::Pending);

	assert!(solver.my_intents().await.unwrap().is_empty());

	let accepted = creator.mutations().accept_proposal(proposal_id).await;
	assert!(accepted.is_success(), "{:?}", accepted.error());

	let mine = creator.my_intents().await.unwrap();
	assert_eq!(mine[0].intent.status, IntentStatus::Completed);
	assert_eq!(mine[0].intent.accepted_proposal_id, Some(proposal_id));
	assert_eq!(mine[0].proposals[0].status, ProposalStatus::Accepted);

	let solver_address = solver.wallet().account().await.unwrap().unwrap().address;
	assert_eq!(ledger.paid_to(solver_address).await, amount);

	let late = solver.mutations().create_proposal(intent_id, amount, "").await;
	assert!(!late.is_success());
}

#[tokio::test]
async fn test_mutations_bump_refresh_and_publish_events() {
	let ledger = shared_ledger();
	let creator = client(config(CREATOR_KEY, false), &ledger).unwrap();
	creator.connect().await.unwrap();

	let mut events = creator.event_bus().subscribe();
	let before = creator.refresh().current();

	let created = creator.mutations().create_intent("Swap USDC for DAI").await;
	assert!(created.is_success());
	assert!(creator.refresh().current() > before);

	let mut seen_created = false;
	while let Ok(event) = events.try_recv() {
		if let MarketEvent::Mutation(MutationEvent::IntentCreated { intent_id, .. }) = event {
			seen_created = intent_id.is_some();
		}
	}
	assert!(seen_created);
}

#[tokio::test]
async fn test_first_connect_registers_identity() {
	let ledger = shared_ledger();
	let creator = client(config(CREATOR_KEY, false), &ledger).unwrap();
	let mut events = creator.event_bus().subscribe();

	let state = creator.connect().await.unwrap();
	let session = state.session().unwrap();
	assert_eq!(
		session.display_address,
		"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
	);
	assert_eq!(session.address, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
	assert_eq!(session.chain_id, 31337);

	let bound = events.recv().await.unwrap();
	assert!(matches!(
		bound,
		MarketEvent::Session(SessionEvent::Bound { .. })
	));
}

#[tokio::test]
async fn test_my_intents_requires_session() {
	let ledger = shared_ledger();
	let creator = client(config(CREATOR_KEY, false), &ledger).unwrap();

	assert!(matches!(
		creator.my_intents().await,
		Err(ClientError::NotConnected)
	));
}

#[tokio::test]
async fn test_run_session_binds_auto_connected_wallet() {
	let ledger = shared_ledger();
	let creator = Arc::new(client(config(CREATOR_KEY, true), &ledger).unwrap());

	let mut states = WatchStream::new(creator.binder().subscribe());
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let runner = {
		let creator = creator.clone();
		tokio::spawn(async move { creator.run_session(shutdown_rx).await })
	};

	let bound = tokio::time::timeout(Duration::from_secs(2), async {
		while let Some(state) = states.next().await {
			if state.session().is_some() {
				return state;
			}
		}
		SessionState::Disconnected
	})
	.await
	.unwrap();
	assert_eq!(bound.session().map(|s| s.chain_id), Some(31337));

	shutdown_tx.send(true).unwrap();
	tokio::time::timeout(Duration::from_secs(2), runner)
		.await
		.unwrap()
		.unwrap();
}

#[tokio::test]
async fn test_unknown_provider_is_rejected() {
	let ledger = shared_ledger();
	let mut config = config(CREATOR_KEY, false);
	config.identity.provider = "supabase".to_string();

	match client(config, &ledger) {
		Err(ClientError::UnknownProvider { kind, name }) => {
			assert_eq!(kind, "identity");
			assert_eq!(name, "supabase");
		}
		Err(other) => panic!("unexpected error: {other}"),
		Ok(_) => panic!("expected an unknown provider error"),
	}
}

#[tokio::test]
async fn test_missing_wallet_key_is_rejected() {
	let ledger = shared_ledger();
	let mut config = config(CREATOR_KEY, false);
	config.wallet.config = toml::Value::Table(toml::map::Map::new());

	assert!(matches!(
		client(config, &ledger),
		Err(ClientError::Wallet(_))
	));
}
