//! Formatting helpers shared by presentation code.

use alloy::primitives::utils::{format_ether, parse_ether, UnitsError};
use alloy::primitives::U256;
use chrono::{DateTime, TimeZone, Utc};

/// Shortens an address to `0x1234...abcd`. Strings under ten characters are
/// returned untouched.
pub fn short_address(address: &str) -> String {
	if address.len() < 10 {
		return address.to_string();
	}
	format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Renders a block timestamp relative to `now`.
pub fn format_relative_time(timestamp: u64, now: DateTime<Utc>) -> String {
	let Some(then) = Utc.timestamp_opt(timestamp as i64, 0).single() else {
		return "unknown".to_string();
	};
	let elapsed = now.signed_duration_since(then);
	let minutes = elapsed.num_minutes();
	let hours = elapsed.num_hours();

	if minutes < 1 {
		"just now".to_string()
	} else if minutes < 60 {
		format!("{}m ago", minutes)
	} else if hours < 24 {
		format!("{}h ago", hours)
	} else {
		format!("{}d ago", elapsed.num_days())
	}
}

/// Renders a wei amount as ether with four decimals.
pub fn format_amount(wei: U256) -> String {
	let ether = format_ether(wei);
	match ether.parse::<f64>() {
		Ok(value) => format!("{:.4} ETH", value),
		Err(_) => format!("{} ETH", ether),
	}
}

/// Parses a decimal ether amount into wei.
pub fn parse_amount(ether: &str) -> Result<U256, UnitsError> {
	parse_ether(ether.trim())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	#[test]
	fn test_short_address() {
		assert_eq!(
			short_address("0x52908400098527886E0F7030069857D2E4169EE7"),
			"0x5290...9EE7"
		);
		assert_eq!(short_address("0xABC"), "0xABC");
	}

	#[test]
	fn test_relative_time() {
		let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
		let at = |d: Duration| (now - d).timestamp() as u64;

		assert_eq!(format_relative_time(at(Duration::seconds(30)), now), "just now");
		assert_eq!(format_relative_time(at(Duration::minutes(5)), now), "5m ago");
		assert_eq!(format_relative_time(at(Duration::hours(3)), now), "3h ago");
		assert_eq!(format_relative_time(at(Duration::days(2)), now), "2d ago");
	}

	#[test]
	fn test_amounts() {
		let wei = parse_amount("0.5").unwrap();
		assert_eq!(wei, U256::from(500_000_000_000_000_000u64));
		assert_eq!(format_amount(wei), "0.5000 ETH");
		assert!(parse_amount("not a number").is_err());
	}
}
