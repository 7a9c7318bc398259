use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::currency::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
	Success,
	Failed,
	Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
	Transfer,
	Trade,
	StakingReward,
	Fee,
	Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
	pub category: OperationCategory,
	/// A free-form, source-agnostic operation label (e.g. "withdrawal",
	/// "deposit", "buy", "sell", "staking_reward") — `category` is what the
	/// zero-sum / reporting logic switches on, `type` is the human label.
	#[serde(rename = "type")]
	pub op_type: String,
}

/// What the venue debits/credits (`gross_amount`) vs. what actually appears
/// on-chain (`net_amount`). For outflows `net_amount <= gross_amount`;
/// violating that is an error (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMovement {
	pub asset: Currency,
	pub gross_amount: Decimal,
	pub net_amount: Decimal,
	pub price_at_tx_time: Option<Decimal>,
}

impl AssetMovement {
	pub fn new(asset: impl Into<Currency>, gross_amount: Decimal, net_amount: Decimal) -> Self {
		Self { asset: asset.into(), gross_amount, net_amount, price_at_tx_time: None }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeScope {
	Network,
	Platform,
	Spread,
	Tax,
	Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSettlement {
	OnChain,
	Balance,
	External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fee {
	pub asset: Currency,
	pub amount: Decimal,
	pub scope: FeeScope,
	pub settlement: FeeSettlement,
	pub price_at_tx_time: Option<Decimal>,
}

impl Fee {
	pub fn new(asset: impl Into<Currency>, amount: Decimal, scope: FeeScope, settlement: FeeSettlement) -> Self {
		Self { asset: asset.into(), amount, scope, settlement, price_at_tx_time: None }
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Movements {
	pub inflows: Vec<AssetMovement>,
	pub outflows: Vec<AssetMovement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
	pub name: String,
	pub height: Option<u64>,
	pub hash: Option<String>,
	pub confirmed: bool,
}

/// The canonical, source-agnostic economic event. Upsert key is `(source,
/// external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalTransaction {
	pub id: Uuid,
	pub external_id: String,
	pub source: String,
	pub source_type: crate::account::SourceType,
	pub datetime: DateTime<Utc>,
	pub timestamp: i64,
	pub status: TxStatus,
	pub operation: Operation,
	pub movements: Movements,
	pub fees: Vec<Fee>,
	pub blockchain: Option<Blockchain>,
	pub note: Option<String>,
	pub metadata: HashMap<String, serde_json::Value>,
}

impl UniversalTransaction {
	/// Upsert key as described in spec §3/§4.8.
	pub fn upsert_key(&self) -> (&str, &str) {
		(&self.source, &self.external_id)
	}

	/// Sum of `gross_amount` across outflows/inflows for a given asset,
	/// grouped by whether the movement is an in- or out-flow. Used by the
	/// zero-sum invariant checks in the processor.
	pub fn net_for_asset(&self, asset: &Currency) -> Decimal {
		let inflow: Decimal = self
			.movements
			.inflows
			.iter()
			.filter(|m| &m.asset == asset)
			.map(|m| m.gross_amount)
			.sum();
		let outflow: Decimal = self
			.movements
			.outflows
			.iter()
			.filter(|m| &m.asset == asset)
			.map(|m| m.gross_amount)
			.sum();
		let onchain_fees: Decimal = self
			.fees
			.iter()
			.filter(|f| &f.asset == asset && f.settlement == FeeSettlement::OnChain)
			.map(|f| f.amount)
			.sum();
		inflow - outflow - onchain_fees
	}

	/// A transaction is a trade when movements reference at least two
	/// different currencies (spec §3 invariant).
	pub fn is_trade(&self) -> bool {
		let mut assets: Vec<&Currency> = self
			.movements
			.inflows
			.iter()
			.map(|m| &m.asset)
			.chain(self.movements.outflows.iter().map(|m| &m.asset))
			.collect();
		assets.sort();
		assets.dedup();
		assets.len() >= 2
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	fn base_tx() -> UniversalTransaction {
		UniversalTransaction {
			id: Uuid::new_v4(),
			external_id: "R1".into(),
			source: "kraken".into(),
			source_type: crate::account::SourceType::ExchangeApi,
			datetime: Utc::now(),
			timestamp: 0,
			status: TxStatus::Success,
			operation: Operation { category: OperationCategory::Transfer, op_type: "withdrawal".into() },
			movements: Movements::default(),
			fees: Vec::new(),
			blockchain: None,
			note: None,
			metadata: HashMap::new(),
		}
	}

	#[test]
	fn net_for_asset_subtracts_outflow_and_onchain_fee() {
		let mut tx = base_tx();
		tx.movements.outflows.push(AssetMovement::new("BTC", dec!(0.5), dec!(0.4996)));
		tx.fees.push(Fee::new("BTC", dec!(0.0004), FeeScope::Network, FeeSettlement::OnChain));
		assert_eq!(tx.net_for_asset(&Currency::new("BTC")), dec!(-0.5004));
	}

	#[test]
	fn platform_fee_with_balance_settlement_not_subtracted() {
		let mut tx = base_tx();
		tx.movements.outflows.push(AssetMovement::new("BTC", dec!(0.00648264), dec!(0.00648264)));
		tx.fees.push(Fee::new("BTC", dec!(0.0004), FeeScope::Platform, FeeSettlement::Balance));
		assert_eq!(tx.net_for_asset(&Currency::new("BTC")), dec!(-0.00648264));
	}

	#[test]
	fn trade_detection_requires_two_assets() {
		let mut tx = base_tx();
		tx.movements.outflows.push(AssetMovement::new("BTC", dec!(1), dec!(1)));
		assert!(!tx.is_trade());
		tx.movements.inflows.push(AssetMovement::new("ETH", dec!(10), dec!(10)));
		assert!(tx.is_trade());
	}
}
