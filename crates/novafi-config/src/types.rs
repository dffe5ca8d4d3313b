use serde::{Deserialize, Serialize};

/// Complete client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	#[serde(default)]
	pub app: AppConfig,
	#[serde(default)]
	pub session: SessionConfig,
	#[serde(default)]
	pub aggregator: AggregatorConfig,
	pub wallet: ProviderConfig,
	pub ledger: ProviderConfig,
	pub identity: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
	/// Application name, used in derived wallet identities.
	#[serde(default = "default_app_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			name: default_app_name(),
			log_level: default_log_level(),
		}
	}
}

/// Session binder tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Upper bound of the random delay added to each poll.
	#[serde(default)]
	pub poll_jitter_ms: u64,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			poll_jitter_ms: 0,
		}
	}
}

/// Aggregator tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
	/// Number of intents the browse view loads.
	#[serde(default = "default_limit")]
	pub default_limit: u64,
	/// Ledger reads allowed in flight at once during a fan-out.
	#[serde(default = "default_max_concurrent_fetches")]
	pub max_concurrent_fetches: usize,
}

impl Default for AggregatorConfig {
	fn default() -> Self {
		Self {
			default_limit: default_limit(),
			max_concurrent_fetches: default_max_concurrent_fetches(),
		}
	}
}

/// Selects a named implementation and carries its configuration table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
	pub provider: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn default_app_name() -> String {
	"novafi".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_poll_interval_ms() -> u64 {
	1000
}

fn default_limit() -> u64 {
	50
}

fn default_max_concurrent_fetches() -> usize {
	8
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}
