use ledgerflow_types::{Currency, ProcessorError, UniversalTransaction};
use rust_decimal::Decimal;

/// Per-source zero-sum tolerance (spec §9). `warn_pct` is logged but does not
/// fail the batch; `error_pct` raises `ProcessorError::Integrity` and aborts
/// the containing batch (spec §4.7 persistence discipline).
#[derive(Debug, Clone, Copy)]
pub struct ToleranceConfig {
	pub warn_pct: Decimal,
	pub error_pct: Decimal,
}

impl ToleranceConfig {
	pub fn for_source(source: &str) -> Self {
		match source {
			"kraken" => Self { warn_pct: Decimal::new(5, 3), error_pct: Decimal::new(2, 2) },
			"coinbase" => Self { warn_pct: Decimal::new(1, 2), error_pct: Decimal::new(3, 2) },
			_ => Self { warn_pct: Decimal::new(15, 3), error_pct: Decimal::new(5, 2) },
		}
	}
}

/// Checks the zero-sum invariant (spec §8 invariant 4) for an
/// `internal_transfer` — the only classification where the same asset moves
/// on both sides of one group and can be expected to net close to zero.
/// Other categories (trade, withdrawal, deposit, ...) legitimately have a
/// non-zero net by construction, so this check is scoped to that one case.
pub fn check_zero_sum(tx: &UniversalTransaction, asset: &Currency, tolerance: &ToleranceConfig) -> Result<(), ProcessorError> {
	if tx.operation.op_type != "internal_transfer" {
		return Ok(());
	}

	let net = tx.net_for_asset(asset);
	let gross_scale: Decimal = tx
		.movements
		.inflows
		.iter()
		.chain(tx.movements.outflows.iter())
		.filter(|m| &m.asset == asset)
		.map(|m| m.gross_amount)
		.sum();
	if gross_scale.is_zero() {
		return Ok(());
	}

	let deviation_pct = (net.abs() / gross_scale.abs()) * Decimal::from(100);
	if deviation_pct > tolerance.error_pct {
		return Err(ProcessorError::Integrity {
			group_key: tx.external_id.clone(),
			asset: asset.as_str().to_string(),
			net: net.to_string(),
			tolerance: tolerance.error_pct.to_string(),
		});
	}
	if deviation_pct > tolerance.warn_pct {
		tracing::warn!(group_key = %tx.external_id, asset = %asset, %net, "zero-sum deviation within error tolerance but above warn threshold");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::{AssetMovement, Movements, Operation, OperationCategory, TxStatus};
	use rust_decimal_macros::dec;
	use std::collections::HashMap;
	use uuid::Uuid;

	fn internal_transfer_tx(inflow: Decimal, outflow: Decimal) -> UniversalTransaction {
		UniversalTransaction {
			id: Uuid::new_v4(),
			external_id: "group-1".into(),
			source: "bitcoin-explorer".into(),
			source_type: ledgerflow_types::SourceType::Blockchain,
			datetime: chrono::Utc::now(),
			timestamp: 0,
			status: TxStatus::Success,
			operation: Operation { category: OperationCategory::Transfer, op_type: "internal_transfer".into() },
			movements: Movements {
				inflows: vec![AssetMovement::new("BTC", inflow, inflow)],
				outflows: vec![AssetMovement::new("BTC", outflow, outflow)],
			},
			fees: Vec::new(),
			blockchain: None,
			note: None,
			metadata: HashMap::new(),
		}
	}

	#[test]
	fn within_tolerance_passes() {
		let tx = internal_transfer_tx(dec!(1.0), dec!(1.0));
		let tolerance = ToleranceConfig::for_source("bitcoin-explorer");
		assert!(check_zero_sum(&tx, &Currency::new("BTC"), &tolerance).is_ok());
	}

	#[test]
	fn beyond_error_pct_fails() {
		let tx = internal_transfer_tx(dec!(1.0), dec!(0.8));
		let tolerance = ToleranceConfig::for_source("bitcoin-explorer");
		assert!(check_zero_sum(&tx, &Currency::new("BTC"), &tolerance).is_err());
	}

	#[test]
	fn non_internal_transfer_is_never_checked() {
		let mut tx = internal_transfer_tx(dec!(1.0), dec!(0.1));
		tx.operation.op_type = "withdrawal".into();
		let tolerance = ToleranceConfig::for_source("kraken");
		assert!(check_zero_sum(&tx, &Currency::new("BTC"), &tolerance).is_ok());
	}
}
