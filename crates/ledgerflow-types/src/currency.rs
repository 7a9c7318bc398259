use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency symbol, normalised to an upper-case identifier.
///
/// Equality and hashing are case-insensitive at construction time only:
/// once built, a `Currency` always holds the upper-cased symbol, so
/// downstream comparisons are plain string comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

/// Fiat symbols recognised without an external lookup. Anything else is
/// treated as a crypto asset unless the caller overrides the classification
/// (e.g. via token metadata fetched by the caller of `Currency::new_typed`).
const KNOWN_FIAT: &[&str] = &[
	"USD", "EUR", "GBP", "CHF", "JPY", "CAD", "AUD", "NZD", "SGD", "HKD",
];

impl Currency {
	pub fn new(symbol: impl AsRef<str>) -> Self {
		Self(symbol.as_ref().trim().to_ascii_uppercase())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Best-effort fiat predicate based on a static symbol table. Callers
	/// with authoritative knowledge (e.g. a token metadata cache that knows
	/// an asset is a stablecoin vs. a fiat currency) should not rely on this
	/// for anything but a default.
	pub fn is_fiat(&self) -> bool {
		KNOWN_FIAT.contains(&self.0.as_str())
	}
}

impl fmt::Display for Currency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Currency {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl From<String> for Currency {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalises_case_and_whitespace() {
		assert_eq!(Currency::new(" btc "), Currency::new("BTC"));
	}

	#[test]
	fn fiat_predicate() {
		assert!(Currency::new("usd").is_fiat());
		assert!(!Currency::new("BTC").is_fiat());
	}
}
