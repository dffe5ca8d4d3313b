//! Shared types for the NovaFi marketplace client.
//!
//! Everything that crosses a crate boundary lives here: the ledger-backed
//! domain records, wallet session state, transaction handles, the event bus
//! and the configuration schema helpers used by every implementation.

pub mod display;
pub mod events;
pub mod market;
pub mod session;
pub mod transaction;
pub mod validation;

pub use display::*;
pub use events::*;
pub use market::*;
pub use session::*;
pub use transaction::*;
pub use validation::*;

pub use alloy::primitives::{Address, U256};
