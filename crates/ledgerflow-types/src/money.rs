use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;

/// An amount of a given currency. All arithmetic in settlement paths is
/// `Decimal`; floats never appear on this path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
	pub amount: Decimal,
	pub currency: Currency,
}

impl Money {
	pub fn new(amount: Decimal, currency: impl Into<Currency>) -> Self {
		Self { amount, currency: currency.into() }
	}

	pub fn is_zero(&self) -> bool {
		self.amount.is_zero()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn zero_detection() {
		assert!(Money::new(dec!(0), "BTC").is_zero());
		assert!(!Money::new(dec!(0.00000001), "BTC").is_zero());
	}
}
