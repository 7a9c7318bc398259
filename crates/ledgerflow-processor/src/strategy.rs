use std::collections::HashSet;

use ledgerflow_types::{AssetMovement, Fee, FeeScope, FeeSettlement, ProcessorError, RawRecord};
use rust_decimal::Decimal;

use crate::fields::parse_row;

#[derive(Debug, Clone, Default)]
pub struct InterpretedGroup {
	pub inflows: Vec<AssetMovement>,
	pub outflows: Vec<AssetMovement>,
	pub fees: Vec<Fee>,
	/// Provider-supplied type labels seen across the group's rows (e.g.
	/// "withdrawal", "staking_reward"), kept around for operation
	/// classification (spec §4.7 step 4) since it's cheaper to read off the
	/// raw rows than to re-derive from the resulting movements alone.
	pub tx_type_hints: Vec<String>,
}

/// Narrow interface every per-source amount-semantics strategy implements
/// (spec §9: "expose a narrow interface `interpret(group, ctx)`").
pub trait InterpretationStrategy: Send + Sync {
	fn name(&self) -> &str;
	fn interpret(&self, rows: &[&RawRecord]) -> Result<InterpretedGroup, ProcessorError>;
}

/// `amount` is already NET; `fee` (if present) is a separate, independent
/// quantity that never changes the movement's own gross/net figures.
/// Recognised by spec §4.7 as `standardAmounts`.
pub struct StandardAmounts;

impl InterpretationStrategy for StandardAmounts {
	fn name(&self) -> &str {
		"standardAmounts"
	}

	fn interpret(&self, rows: &[&RawRecord]) -> Result<InterpretedGroup, ProcessorError> {
		let mut group = InterpretedGroup::default();
		for row in rows {
			let fields = parse_row(row)?;
			if let Some(tx_type) = &fields.tx_type {
				group.tx_type_hints.push(tx_type.clone());
			}
			if fields.is_fee_row {
				group.fees.push(Fee::new(fields.asset, fields.amount.abs(), FeeScope::Platform, FeeSettlement::Balance));
				continue;
			}

			let gross = fields.amount.abs();
			let movement = AssetMovement::new(fields.asset.clone(), gross, gross);
			if fields.amount.is_sign_negative() {
				group.outflows.push(movement);
			} else {
				group.inflows.push(movement);
			}

			if let Some(fee) = fields.fee {
				if !fee.is_zero() {
					let fee_asset = fields.fee_asset.unwrap_or(fields.asset);
					group.fees.push(Fee::new(fee_asset, fee, FeeScope::Platform, FeeSettlement::Balance));
				}
			}
		}
		Ok(group)
	}
}

/// `amount` is GROSS and includes the fee for withdrawal-shaped rows
/// (`netAmount = |amount| - fee`, `settlement = onChain`); for every other
/// row type `amount` is already net of any on-chain cost, and an inline fee
/// settles against the balance instead. Identical fees reported on more
/// than one correlated leg are kept only on the first occurrence, in row
/// order (spec §4.7: `coinbaseGrossAmounts`). Parameterising `fee_scope`
/// lets the same mechanics serve both Coinbase-style exchange withdrawals
/// (`platform`) and native on-chain sends (`network`) without duplicating
/// the gross/net/dedup logic — the two published scenarios (S2, S3) differ
/// only in that one field.
pub struct GrossAmountsStrategy {
	pub name: String,
	pub fee_scope: FeeScope,
}

impl GrossAmountsStrategy {
	pub fn coinbase() -> Self {
		Self { name: "coinbaseGrossAmounts".to_string(), fee_scope: FeeScope::Platform }
	}

	pub fn native_on_chain() -> Self {
		Self { name: "nativeGrossAmounts".to_string(), fee_scope: FeeScope::Network }
	}
}

impl InterpretationStrategy for GrossAmountsStrategy {
	fn name(&self) -> &str {
		&self.name
	}

	fn interpret(&self, rows: &[&RawRecord]) -> Result<InterpretedGroup, ProcessorError> {
		let mut group = InterpretedGroup::default();
		let mut seen_fees: HashSet<(String, String)> = HashSet::new();

		for row in rows {
			let fields = parse_row(row)?;
			if let Some(tx_type) = &fields.tx_type {
				group.tx_type_hints.push(tx_type.clone());
			}
			if fields.is_fee_row {
				let fee_asset = fields.asset;
				let amount = fields.amount.abs();
				if seen_fees.insert((fee_asset.as_str().to_string(), amount.to_string())) {
					group.fees.push(Fee::new(fee_asset, amount, self.fee_scope, FeeSettlement::OnChain));
				}
				continue;
			}

			let is_withdrawal = fields.tx_type.as_deref() == Some("withdrawal");
			let gross = fields.amount.abs();

			if is_withdrawal {
				let fee = fields.fee.unwrap_or(Decimal::ZERO);
				let net = gross - fee;
				group.outflows.push(AssetMovement::new(fields.asset.clone(), gross, net));
				if !fee.is_zero() {
					let fee_asset = fields.fee_asset.unwrap_or_else(|| fields.asset.clone());
					if seen_fees.insert((fee_asset.as_str().to_string(), fee.to_string())) {
						group.fees.push(Fee::new(fee_asset, fee, self.fee_scope, FeeSettlement::OnChain));
					}
				}
			} else {
				let movement = AssetMovement::new(fields.asset.clone(), gross, gross);
				if fields.amount.is_sign_negative() {
					group.outflows.push(movement);
				} else {
					group.inflows.push(movement);
				}
				if let Some(fee) = fields.fee {
					if !fee.is_zero() {
						let fee_asset = fields.fee_asset.unwrap_or(fields.asset);
						if seen_fees.insert((fee_asset.as_str().to_string(), fee.to_string())) {
							group.fees.push(Fee::new(fee_asset, fee, self.fee_scope, FeeSettlement::Balance));
						}
					}
				}
			}
		}
		Ok(group)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::{ProcessedState, SourceType, StreamType};
	use rust_decimal_macros::dec;
	use uuid::Uuid;

	fn row(id_byte: u8, payload: serde_json::Value) -> RawRecord {
		RawRecord {
			id: Uuid::from_bytes([id_byte; 16]),
			account_id: Uuid::nil(),
			provider_name: "kraken".into(),
			source_type: SourceType::ExchangeApi,
			event_id: format!("evt-{id_byte}"),
			external_id: format!("ext-{id_byte}"),
			provider_data: serde_json::Value::Null,
			normalized_data: Some(payload),
			stream_type: StreamType::Normal,
			created_at: chrono::Utc::now(),
			processed: ProcessedState::Pending,
		}
	}

	#[test]
	fn s1_kraken_btc_withdrawal() {
		let principal = row(1, serde_json::json!({"amount": "-0.00648264", "asset": "BTC"}));
		let fee_row = row(2, serde_json::json!({"amount": "-0.0004", "asset": "BTC", "kind": "fee"}));
		let rows = vec![&principal, &fee_row];
		let group = StandardAmounts.interpret(&rows).unwrap();

		assert_eq!(group.outflows.len(), 1);
		assert_eq!(group.outflows[0].gross_amount, dec!(0.00648264));
		assert_eq!(group.outflows[0].net_amount, dec!(0.00648264));
		assert_eq!(group.fees.len(), 1);
		assert_eq!(group.fees[0].amount, dec!(0.0004));
		assert_eq!(group.fees[0].scope, FeeScope::Platform);
		assert_eq!(group.fees[0].settlement, FeeSettlement::Balance);
	}

	#[test]
	fn s2_coinbase_uni_withdrawal() {
		let principal = row(1, serde_json::json!({
			"amount": "-18", "asset": "UNI", "fee": "0.16425517", "txType": "withdrawal",
		}));
		let rows = vec![&principal];
		let group = GrossAmountsStrategy::coinbase().interpret(&rows).unwrap();

		assert_eq!(group.outflows.len(), 1);
		assert_eq!(group.outflows[0].gross_amount, dec!(18));
		assert_eq!(group.outflows[0].net_amount, dec!(17.83574483));
		assert_eq!(group.fees.len(), 1);
		assert_eq!(group.fees[0].amount, dec!(0.16425517));
		assert_eq!(group.fees[0].scope, FeeScope::Platform);
		assert_eq!(group.fees[0].settlement, FeeSettlement::OnChain);
	}

	#[test]
	fn deduplicates_identical_fee_reported_on_two_legs() {
		let leg_a = row(1, serde_json::json!({
			"amount": "-10", "asset": "UNI", "fee": "0.5", "txType": "withdrawal",
		}));
		let leg_b = row(2, serde_json::json!({
			"amount": "-10", "asset": "UNI", "fee": "0.5", "txType": "withdrawal",
		}));
		let rows = vec![&leg_a, &leg_b];
		let group = GrossAmountsStrategy::coinbase().interpret(&rows).unwrap();
		assert_eq!(group.fees.len(), 1, "identical fee on a second correlated leg must not double count");
	}
}
