//! Configuration loading from files and environment.

use crate::Config;
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Loads a [`Config`] from a TOML, JSON or YAML file.
///
/// `${VAR}` placeholders are substituted from the environment before
/// parsing, then `<PREFIX>LOG_LEVEL` and `<PREFIX>POLL_INTERVAL_MS` override
/// the parsed values.
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "NOVAFI_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", file_path);

		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.display().to_string()))
			}
			Err(e) => return Err(e.into()),
		};

		let substituted = substitute_env_vars(&content)?;
		let mut config = parse(file_path, &substituted)?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.app.log_level = log_level;
		}

		if let Ok(interval) = env::var(format!("{}POLL_INTERVAL_MS", self.env_prefix)) {
			config.session.poll_interval_ms = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid poll interval: {}", e))
			})?;
		}

		Ok(())
	}
}

fn parse(path: &Path, contents: &str) -> Result<Config, ConfigError> {
	match path.extension().and_then(|s| s.to_str()) {
		Some("json") => {
			serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		Some("yaml") | Some("yml") => {
			serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		_ => toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string())),
	}
}

/// Replaces every `${VAR_NAME}` with the value of that environment variable.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(format!("Invalid substitution pattern: {}", e)))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.app.name.trim().is_empty() {
		return Err(ConfigError::ValidationError(
			"app.name must not be empty".to_string(),
		));
	}

	if config.session.poll_interval_ms == 0 {
		return Err(ConfigError::ValidationError(
			"session.poll_interval_ms must be greater than zero".to_string(),
		));
	}

	if config.aggregator.default_limit == 0 || config.aggregator.max_concurrent_fetches == 0 {
		return Err(ConfigError::ValidationError(
			"aggregator limits must be greater than zero".to_string(),
		));
	}

	for (section, provider) in [
		("wallet", &config.wallet),
		("ledger", &config.ledger),
		("identity", &config.identity),
	] {
		if provider.provider.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"{}.provider must name an implementation",
				section
			)));
		}
	}

	Ok(())
}
