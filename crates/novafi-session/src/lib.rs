//! Wallet session binding.
//!
//! The [`SessionBinder`] keeps exactly one identity-store session attached to
//! whichever wallet the connector currently exposes. It polls the connector,
//! binds on connect, rebinds when the address changes and unbinds when the
//! wallet goes away. Bind failures fail closed: the wallet is disconnected
//! rather than left attached without an application account.
//!
//! Every transition is published on a `watch` channel so presentation code can
//! render the current [`SessionState`] without polling the binder.

use novafi_identity::{IdentityError, IdentityService, UserMetadata};
use novafi_types::{
	canonical_address, short_address, Address, EventBus, MarketEvent, SessionEvent,
	SessionState, WalletSession,
};
use novafi_wallet::WalletService;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BindError {
	#[error("Sign-in failed: {0}")]
	SignIn(IdentityError),
	#[error("Registration failed: {0}")]
	Registration(IdentityError),
	#[error("Wallet connector error: {0}")]
	Wallet(String),
}

/// Polling and naming parameters for the binder.
#[derive(Debug, Clone)]
pub struct BinderSettings {
	/// Application name used in derived account emails.
	pub app_name: String,
	pub poll_interval: Duration,
	/// Upper bound of the random delay added to each poll interval.
	pub poll_jitter: Duration,
}

impl Default for BinderSettings {
	fn default() -> Self {
		Self {
			app_name: "novafi".to_string(),
			poll_interval: Duration::from_millis(1000),
			poll_jitter: Duration::ZERO,
		}
	}
}

/// Credentials derived from a wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCredentials {
	pub email: String,
	pub password: String,
}

impl WalletCredentials {
	pub fn for_address(address: &Address, app_name: &str) -> Self {
		let canonical = canonical_address(address);
		Self {
			email: format!("{}@wallet.{}", canonical, app_name),
			password: canonical,
		}
	}
}

/// Profile metadata registered for a first-time wallet.
pub fn registration_metadata(address: &Address) -> UserMetadata {
	let checksummed = address.to_string();
	UserMetadata {
		display_name: short_address(&checksummed),
		wallet_address: checksummed,
	}
}

#[derive(Debug, Default)]
struct Markers {
	/// Address and chain last reported by the connector.
	observed: Option<(Address, u64)>,
	/// Address whose identity session is established.
	authenticated: Option<Address>,
	session: Option<WalletSession>,
}

/// Clears the in-flight flag when a bind attempt ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

pub struct SessionBinder {
	wallet: Arc<WalletService>,
	identity: Arc<IdentityService>,
	settings: BinderSettings,
	markers: Mutex<Markers>,
	bind_in_flight: AtomicBool,
	state: watch::Sender<SessionState>,
	event_bus: EventBus,
}

impl SessionBinder {
	pub fn new(
		wallet: Arc<WalletService>,
		identity: Arc<IdentityService>,
		settings: BinderSettings,
		event_bus: EventBus,
	) -> Self {
		let (state, _) = watch::channel(SessionState::Disconnected);
		Self {
			wallet,
			identity,
			settings,
			markers: Mutex::new(Markers::default()),
			bind_in_flight: AtomicBool::new(false),
			state,
			event_bus,
		}
	}

	pub fn subscribe(&self) -> watch::Receiver<SessionState> {
		self.state.subscribe()
	}

	pub fn state(&self) -> SessionState {
		self.state.borrow().clone()
	}

	pub fn current_session(&self) -> Option<WalletSession> {
		self.state.borrow().session().cloned()
	}

	/// Reconciles the binder with one observation of the connector.
	pub async fn poll_once(&self) {
		let connector = self.wallet.state().await;
		debug!(open = connector.open, network = ?connector.selected_network_id, "Polling wallet connector");

		if connector.is_settled_connection() {
			let account = match self.wallet.account().await {
				Ok(Some(account)) => account,
				Ok(None) => {
					debug!("Connector reported a network but no account");
					return;
				}
				Err(e) => {
					warn!(error = %e, "Failed to read wallet account");
					return;
				}
			};
			self.observe(account.address, account.chain_id).await;
			return;
		}

		let believes_connected = self.state.borrow().is_connected();
		if connector.selected_network_id.is_none() && believes_connected {
			info!("Wallet disconnected");
			self.unbind().await;
		}
	}

	async fn observe(&self, address: Address, chain_id: u64) {
		let (stale, needs_bind) = {
			let mut markers = self.markers.lock().await;
			let mut stale = None;

			let observed = markers.observed;
			match observed {
				Some((observed, _)) if observed == address => {
					if markers.observed != Some((address, chain_id)) {
						markers.observed = Some((address, chain_id));
						if let Some(session) = markers.session.as_mut() {
							session.chain_id = chain_id;
							self.state
								.send_replace(SessionState::Connected(session.clone()));
						}
						info!(chain_id, "Wallet switched network");
					}
				}
				_ => {
					if markers.authenticated.is_some_and(|bound| bound != address) {
						stale = markers.session.take().map(|session| session.address);
						markers.authenticated = None;
					}
					markers.observed = Some((address, chain_id));
					self.state
						.send_replace(SessionState::Connecting { address, chain_id });
					info!(address = %address, chain_id, "Wallet connected");
				}
			}

			(stale, markers.authenticated != Some(address))
		};

		if let Some(previous) = stale {
			info!(previous = %previous, "Wallet address changed, ending previous session");
			if let Err(e) = self.identity.sign_out().await {
				warn!(error = %e, "Failed to sign out previous session");
			}
			let _ = self.event_bus.publish(MarketEvent::Session(SessionEvent::Unbound {
				address: Some(previous),
			}));
		}

		if needs_bind && !self.bind_in_flight.load(Ordering::SeqCst) {
			if let Err(e) = self.bind(address, chain_id).await {
				warn!(address = %address, error = %e, "Wallet session bind failed");
			}
		}
	}

	/// Establishes the identity session for `address`.
	///
	/// A no-op when the address is already authenticated or another bind is in
	/// flight. On failure the wallet is disconnected before the error returns.
	pub async fn bind(&self, address: Address, chain_id: u64) -> Result<(), BindError> {
		if self.markers.lock().await.authenticated == Some(address) {
			debug!(address = %address, "Wallet already authenticated");
			return Ok(());
		}
		if self
			.bind_in_flight
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			debug!(address = %address, "Bind already in flight");
			return Ok(());
		}
		let _guard = InFlightGuard(&self.bind_in_flight);

		{
			let mut markers = self.markers.lock().await;
			if markers.observed.map(|(observed, _)| observed) != Some(address) {
				markers.observed = Some((address, chain_id));
			}
		}

		let session_id = match self.authenticate(&address).await {
			Ok(session_id) => session_id,
			Err(e) => {
				warn!(address = %address, error = %e, "Failing closed, disconnecting wallet");
				let _ = self.event_bus.publish(MarketEvent::Session(SessionEvent::BindFailed {
					address: canonical_address(&address),
					reason: e.to_string(),
				}));
				self.disconnect().await;
				return Err(e);
			}
		};

		let session = WalletSession {
			address: canonical_address(&address),
			display_address: address.to_string(),
			chain_id,
			session_id,
		};

		{
			let mut markers = self.markers.lock().await;
			// The wallet moved on while the identity store answered.
			if markers.observed.map(|(observed, _)| observed) != Some(address) {
				drop(markers);
				debug!(address = %address, "Discarding session for a wallet no longer connected");
				if let Err(e) = self.identity.sign_out().await {
					warn!(error = %e, "Failed to sign out discarded session");
				}
				return Ok(());
			}
			markers.authenticated = Some(address);
			markers.session = Some(session.clone());
		}

		info!(address = %address, session_id = %session.session_id, "Wallet session bound");
		let _ = self.event_bus.publish(MarketEvent::Session(SessionEvent::Bound {
			address: session.address.clone(),
			session_id: session.session_id.clone(),
		}));
		self.state.send_replace(SessionState::Connected(session));
		Ok(())
	}

	/// Signs in with the wallet-derived credentials, registering the account
	/// first when the store does not know it.
	async fn authenticate(&self, address: &Address) -> Result<String, BindError> {
		let credentials = WalletCredentials::for_address(address, &self.settings.app_name);

		match self
			.identity
			.sign_in(&credentials.email, &credentials.password)
			.await
		{
			Ok(session) => return Ok(session.user_id),
			Err(IdentityError::InvalidCredentials) => {
				info!(address = %address, "Registering account for new wallet");
			}
			Err(e) => return Err(BindError::SignIn(e)),
		}

		self.identity
			.sign_up(
				&credentials.email,
				&credentials.password,
				&registration_metadata(address),
			)
			.await
			.map_err(BindError::Registration)?;

		let session = self
			.identity
			.sign_in(&credentials.email, &credentials.password)
			.await
			.map_err(BindError::SignIn)?;
		Ok(session.user_id)
	}

	/// Drops the session and returns to `Disconnected`.
	pub async fn unbind(&self) {
		let previous = {
			let mut markers = self.markers.lock().await;
			let previous = markers
				.session
				.take()
				.map(|session| session.address)
				.or_else(|| markers.observed.map(|(address, _)| canonical_address(&address)));
			markers.observed = None;
			markers.authenticated = None;
			previous
		};

		if let Err(e) = self.identity.sign_out().await {
			warn!(error = %e, "Failed to sign out of identity store");
		}

		self.state.send_replace(SessionState::Disconnected);
		info!(address = ?previous, "Wallet session unbound");
		let _ = self
			.event_bus
			.publish(MarketEvent::Session(SessionEvent::Unbound { address: previous }));
	}

	/// Opens the wallet connector and binds whatever it connects.
	pub async fn connect(&self) -> Result<SessionState, BindError> {
		self.wallet
			.open()
			.await
			.map_err(|e| BindError::Wallet(e.to_string()))?;
		self.poll_once().await;
		Ok(self.state())
	}

	/// Disconnects the wallet connector and unbinds.
	pub async fn disconnect(&self) {
		if let Err(e) = self.wallet.disconnect().await {
			warn!(error = %e, "Failed to disconnect wallet connector");
		}
		self.unbind().await;
	}

	fn next_delay(&self) -> Duration {
		let jitter_ms = self.settings.poll_jitter.as_millis() as u64;
		if jitter_ms == 0 {
			return self.settings.poll_interval;
		}
		self.settings.poll_interval
			+ Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
	}

	/// Polls until `shutdown` flips to true or its sender is dropped.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
		info!(
			interval_ms = self.settings.poll_interval.as_millis() as u64,
			"Session binder started"
		);

		loop {
			if *shutdown.borrow() {
				break;
			}
			self.poll_once().await;

			tokio::select! {
				_ = tokio::time::sleep(self.next_delay()) => {}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		info!("Session binder stopped");
	}
}
