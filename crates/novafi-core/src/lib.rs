//! Client wiring for the NovaFi marketplace.
//!
//! [`ClientBuilder`] turns a [`Config`] into a running [`MarketplaceClient`]:
//! it resolves each configured provider name to a registered factory,
//! validates the provider's configuration table against the implementation's
//! schema, and connects the wallet, ledger, identity store, aggregator, session
//! binder and mutation facade to one event bus and one refresh signal.

use novafi_aggregator::Aggregator;
use novafi_config::{Config, ProviderConfig};
use novafi_identity::{IdentityError, IdentityInterface, IdentityService};
use novafi_ledger::{GatewayError, LedgerInterface, LedgerService};
use novafi_mutation::MutationFacade;
use novafi_session::{BindError, BinderSettings, SessionBinder};
use novafi_types::{
	Address, ConfigSchema, EventBus, Intent, IntentWithProposals, RefreshSignal, SessionState,
	ValidationError,
};
use novafi_wallet::{WalletError, WalletInterface, WalletService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("No {kind} factory registered for provider '{name}'")]
	UnknownProvider { kind: &'static str, name: String },
	#[error("Invalid {kind} configuration: {source}")]
	Validation {
		kind: &'static str,
		source: ValidationError,
	},
	#[error("Wallet error: {0}")]
	Wallet(#[from] WalletError),
	#[error("Ledger error: {0}")]
	Ledger(#[from] GatewayError),
	#[error("Identity store error: {0}")]
	Identity(#[from] IdentityError),
	#[error("Session error: {0}")]
	Session(#[from] BindError),
	#[error("No wallet session is bound")]
	NotConnected,
}

type WalletFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> + Send>;
type LedgerFactory = Box<
	dyn Fn(&toml::Value, Arc<WalletService>) -> Result<Box<dyn LedgerInterface>, GatewayError>
		+ Send,
>;
type IdentityFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> + Send>;

const EVENT_BUS_CAPACITY: usize = 256;

/// Builds a [`MarketplaceClient`] from configuration and named factories.
pub struct ClientBuilder {
	config: Config,
	wallet_factories: HashMap<String, WalletFactory>,
	ledger_factories: HashMap<String, LedgerFactory>,
	identity_factories: HashMap<String, IdentityFactory>,
}

impl ClientBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			wallet_factories: HashMap::new(),
			ledger_factories: HashMap::new(),
			identity_factories: HashMap::new(),
		}
	}

	pub fn with_wallet_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn WalletInterface>, WalletError> + Send + 'static,
	{
		self.wallet_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_ledger_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value, Arc<WalletService>) -> Result<Box<dyn LedgerInterface>, GatewayError>
			+ Send
			+ 'static,
	{
		self.ledger_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_identity_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError> + Send + 'static,
	{
		self.identity_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<MarketplaceClient, ClientError> {
		let config = self.config;

		let wallet_factory = lookup(&self.wallet_factories, "wallet", &config.wallet)?;
		let connector = wallet_factory(&config.wallet.config)?;
		validate("wallet", connector.config_schema(), &config.wallet)?;
		let wallet = Arc::new(WalletService::new(connector));

		let ledger_factory = lookup(&self.ledger_factories, "ledger", &config.ledger)?;
		let gateway = ledger_factory(&config.ledger.config, wallet.clone())?;
		validate("ledger", gateway.config_schema(), &config.ledger)?;
		let ledger = Arc::new(LedgerService::new(gateway));

		let identity_factory = lookup(&self.identity_factories, "identity", &config.identity)?;
		let store = identity_factory(&config.identity.config)?;
		validate("identity", store.config_schema(), &config.identity)?;
		let identity = Arc::new(IdentityService::new(store));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let refresh = RefreshSignal::new();

		let aggregator = Arc::new(Aggregator::new(
			ledger.clone(),
			config.aggregator.max_concurrent_fetches,
		));

		let binder = Arc::new(SessionBinder::new(
			wallet.clone(),
			identity,
			BinderSettings {
				app_name: config.app.name.clone(),
				poll_interval: Duration::from_millis(config.session.poll_interval_ms),
				poll_jitter: Duration::from_millis(config.session.poll_jitter_ms),
			},
			event_bus.clone(),
		));

		let mutations = Arc::new(MutationFacade::new(
			ledger.clone(),
			aggregator.clone(),
			refresh.clone(),
			event_bus.clone(),
		));

		info!(
			wallet = %config.wallet.provider,
			ledger = %config.ledger.provider,
			identity = %config.identity.provider,
			"Marketplace client assembled"
		);

		Ok(MarketplaceClient {
			config,
			wallet,
			ledger,
			aggregator,
			binder,
			mutations,
			event_bus,
			refresh,
		})
	}
}

fn lookup<'a, F>(
	factories: &'a HashMap<String, F>,
	kind: &'static str,
	provider: &ProviderConfig,
) -> Result<&'a F, ClientError> {
	factories
		.get(&provider.provider)
		.ok_or_else(|| ClientError::UnknownProvider {
			kind,
			name: provider.provider.clone(),
		})
}

fn validate(
	kind: &'static str,
	schema: Box<dyn ConfigSchema>,
	provider: &ProviderConfig,
) -> Result<(), ClientError> {
	schema
		.validate(&provider.config)
		.map_err(|source| ClientError::Validation { kind, source })
}

/// A fully wired marketplace client.
pub struct MarketplaceClient {
	config: Config,
	wallet: Arc<WalletService>,
	ledger: Arc<LedgerService>,
	aggregator: Arc<Aggregator>,
	binder: Arc<SessionBinder>,
	mutations: Arc<MutationFacade>,
	event_bus: EventBus,
	refresh: RefreshSignal,
}

impl MarketplaceClient {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn wallet(&self) -> &Arc<WalletService> {
		&self.wallet
	}

	pub fn ledger(&self) -> &Arc<LedgerService> {
		&self.ledger
	}

	pub fn aggregator(&self) -> &Arc<Aggregator> {
		&self.aggregator
	}

	pub fn binder(&self) -> &Arc<SessionBinder> {
		&self.binder
	}

	pub fn mutations(&self) -> &Arc<MutationFacade> {
		&self.mutations
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn refresh(&self) -> &RefreshSignal {
		&self.refresh
	}

	/// Opens the wallet and binds its session.
	pub async fn connect(&self) -> Result<SessionState, ClientError> {
		Ok(self.binder.connect().await?)
	}

	/// The most recent intents; `None` uses the configured default limit.
	pub async fn browse(&self, limit: Option<u64>) -> Vec<Intent> {
		let limit = limit.unwrap_or(self.config.aggregator.default_limit);
		self.aggregator.list_open_intents(limit).await
	}

	/// Intents owned by the bound wallet, with their proposals.
	pub async fn my_intents(&self) -> Result<Vec<IntentWithProposals>, ClientError> {
		let session = self.binder.current_session().ok_or(ClientError::NotConnected)?;
		let owner: Address = session
			.address
			.parse()
			.map_err(|_| ClientError::NotConnected)?;
		Ok(self.aggregator.list_my_intents_with_proposals(owner).await)
	}

	/// Drives the session binder until `shutdown` flips to true.
	pub async fn run_session(&self, shutdown: watch::Receiver<bool>) {
		self.binder.run(shutdown).await;
	}
}
