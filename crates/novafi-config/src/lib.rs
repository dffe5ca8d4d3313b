//! Configuration for the NovaFi client.
//!
//! A configuration file names one provider for each external collaborator
//! (wallet, ledger, identity store) and carries that provider's own table,
//! plus the tunables of the session binder and the aggregator.

mod loader;
mod types;

pub use loader::{ConfigError, ConfigLoader};
pub use types::*;
