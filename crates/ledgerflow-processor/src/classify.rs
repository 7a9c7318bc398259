use ledgerflow_types::{Operation, OperationCategory};

use crate::strategy::InterpretedGroup;

/// Classifies the operation from fund flow (spec §4.7 step 4). `tx_type_hints`
/// carries the provider's own type labels collected while interpreting the
/// group, used only to distinguish a reward deposit from an ordinary one —
/// the category itself is always derived from the shape of the movements.
pub fn classify_operation(group: &InterpretedGroup) -> Operation {
	let distinct_assets = {
		let mut assets: Vec<_> = group
			.inflows
			.iter()
			.map(|m| &m.asset)
			.chain(group.outflows.iter().map(|m| &m.asset))
			.collect();
		assets.sort();
		assets.dedup();
		assets.len()
	};

	let has_inflow = !group.inflows.is_empty();
	let has_outflow = !group.outflows.is_empty();
	let is_reward = group.tx_type_hints.iter().any(|t| t.contains("reward") || t.contains("staking"));

	if has_inflow && has_outflow && distinct_assets >= 2 {
		Operation { category: OperationCategory::Trade, op_type: "trade".to_string() }
	} else if has_outflow && !has_inflow {
		Operation { category: OperationCategory::Transfer, op_type: "withdrawal".to_string() }
	} else if has_inflow && !has_outflow && is_reward {
		Operation { category: OperationCategory::StakingReward, op_type: "staking_reward".to_string() }
	} else if has_inflow && !has_outflow {
		Operation { category: OperationCategory::Transfer, op_type: "deposit".to_string() }
	} else if has_inflow && has_outflow {
		// Same-asset movement on both sides: an internal transfer between
		// the user's own tracked accounts.
		Operation { category: OperationCategory::Transfer, op_type: "internal_transfer".to_string() }
	} else if !group.fees.is_empty() {
		Operation { category: OperationCategory::Fee, op_type: "fee_only".to_string() }
	} else {
		Operation { category: OperationCategory::Other, op_type: "unknown".to_string() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::AssetMovement;
	use rust_decimal_macros::dec;

	#[test]
	fn trade_requires_two_distinct_assets_on_both_sides() {
		let mut group = InterpretedGroup::default();
		group.outflows.push(AssetMovement::new("BTC", dec!(1), dec!(1)));
		group.inflows.push(AssetMovement::new("ETH", dec!(10), dec!(10)));
		assert_eq!(classify_operation(&group).category, OperationCategory::Trade);
	}

	#[test]
	fn single_outflow_is_withdrawal() {
		let mut group = InterpretedGroup::default();
		group.outflows.push(AssetMovement::new("BTC", dec!(0.5), dec!(0.4996)));
		assert_eq!(classify_operation(&group).op_type, "withdrawal");
	}

	#[test]
	fn reward_hinted_inflow_is_staking_reward() {
		let mut group = InterpretedGroup::default();
		group.inflows.push(AssetMovement::new("ETH", dec!(0.01), dec!(0.01)));
		group.tx_type_hints.push("staking_reward".to_string());
		assert_eq!(classify_operation(&group).category, OperationCategory::StakingReward);
	}
}
