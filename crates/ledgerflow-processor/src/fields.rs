use ledgerflow_types::{Currency, ProcessorError, RawRecord};
use rust_decimal::Decimal;
use std::str::FromStr;

/// The per-row fields every interpretation strategy needs, parsed once from
/// `normalized_data`/`provider_data` (spec §4.7). The wire shape is
/// deliberately simple: `amount` (signed, venue sign convention), `asset`,
/// an optional inline `fee`/`feeAsset` for rows that carry their own fee,
/// and an optional `kind: "fee"` tag for sources that report the fee as its
/// own correlated row (e.g. Kraken's ledger export — spec §8 scenario S1).
pub struct RowFields {
	pub amount: Decimal,
	pub asset: Currency,
	pub fee: Option<Decimal>,
	pub fee_asset: Option<Currency>,
	pub tx_type: Option<String>,
	pub is_fee_row: bool,
}

pub fn parse_row(row: &RawRecord) -> Result<RowFields, ProcessorError> {
	let payload = row.interpretable_payload().ok_or_else(|| validation(row, "$", "row has no interpretable payload"))?;

	let amount_str = payload
		.get("amount")
		.and_then(|v| v.as_str())
		.ok_or_else(|| validation(row, "$.amount", "missing required field 'amount'"))?;
	let amount = Decimal::from_str(amount_str).map_err(|e| validation(row, "$.amount", &e.to_string()))?;

	let asset = payload
		.get("asset")
		.and_then(|v| v.as_str())
		.map(Currency::new)
		.ok_or_else(|| validation(row, "$.asset", "missing required field 'asset'"))?;

	let fee = payload
		.get("fee")
		.and_then(|v| v.as_str())
		.map(Decimal::from_str)
		.transpose()
		.map_err(|e| validation(row, "$.fee", &e.to_string()))?;

	let fee_asset = payload.get("feeAsset").and_then(|v| v.as_str()).map(Currency::new);
	let tx_type = payload.get("txType").and_then(|v| v.as_str()).map(str::to_string);
	let is_fee_row = payload.get("kind").and_then(|v| v.as_str()) == Some("fee");

	Ok(RowFields { amount, asset, fee, fee_asset, tx_type, is_fee_row })
}

fn validation(row: &RawRecord, schema_path: &str, message: &str) -> ProcessorError {
	ProcessorError::Validation {
		row_id: row.id,
		event_id: row.event_id.clone(),
		schema_path: schema_path.to_string(),
		message: message.to_string(),
	}
}
