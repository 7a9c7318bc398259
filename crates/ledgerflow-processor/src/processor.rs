use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledgerflow_store::{RawDataStore, SessionStore, TransactionRepository};
use ledgerflow_types::{
	Blockchain, Currency, EngineError, Movements, ProcessorError, RawRecord, TxStatus, UniversalTransaction,
};
use uuid::Uuid;

use crate::batch::BatchProvider;
use crate::classify::classify_operation;
use crate::grouping::GroupingStrategy;
use crate::strategy::{InterpretationStrategy, InterpretedGroup};
use crate::tolerance::{check_zero_sum, ToleranceConfig};

const FETCH_LIMIT: i64 = 5_000;

/// Mirrors `TransactionRepository::upsert_batch`'s own chunk size; raw rows
/// are marked processed in batches of at most this many ids (spec §4.7).
const MARK_PROCESSED_BATCH: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct ProcessingOutcome {
	pub rows_processed: u64,
	pub transactions_written: u64,
}

/// Drives one account's pending raw rows through fetch → chunk → normalize →
/// group → interpret → classify → persist (spec §4.7). A single group's
/// validation or integrity failure is fatal to the whole run — there are no
/// silent partial commits (spec §4.7 persistence discipline, §7).
pub struct Processor {
	raw_data: RawDataStore,
	transactions: TransactionRepository,
	sessions: SessionStore,
}

impl Processor {
	pub fn new(raw_data: RawDataStore, transactions: TransactionRepository, sessions: SessionStore) -> Self {
		Self { raw_data, transactions, sessions }
	}

	pub async fn process_account(
		&self,
		account_id: Uuid,
		source: &str,
		grouping: GroupingStrategy,
		batching: &dyn BatchProvider,
		strategy: &dyn InterpretationStrategy,
	) -> Result<ProcessingOutcome, EngineError> {
		if self.sessions.has_blocking_session(account_id).await? {
			return Err(EngineError::Other(format!(
				"account {account_id} has a non-completed import session; refusing to process"
			)));
		}

		let rows = self.raw_data.pending_for_account(account_id, FETCH_LIMIT).await?;
		let tolerance = ToleranceConfig::for_source(source);
		let mut outcome = ProcessingOutcome::default();

		for chunk in batching.chunks(rows) {
			let groups = grouping.group(&chunk);
			let mut batch_txs = Vec::with_capacity(groups.len());
			let mut row_ids = Vec::with_capacity(chunk.len());

			for (group_key, group_rows) in groups {
				let interpreted = strategy.interpret(&group_rows)?;
				let tx = build_transaction(source, &group_key, &interpreted, &group_rows)?;
				for asset in distinct_assets(&tx) {
					check_zero_sum(&tx, &asset, &tolerance)?;
				}
				row_ids.extend(group_rows.iter().map(|r| r.id));
				batch_txs.push(tx);
			}

			self.transactions.upsert_batch(&batch_txs).await.map_err(|e| {
				ProcessorError::Fatal {
					first_row_id: row_ids.first().copied().unwrap_or(Uuid::nil()),
					message: e.to_string(),
				}
			})?;
			for id_chunk in row_ids.chunks(MARK_PROCESSED_BATCH) {
				self.raw_data.mark_processed(id_chunk).await?;
			}

			outcome.transactions_written += batch_txs.len() as u64;
			outcome.rows_processed += row_ids.len() as u64;
		}

		Ok(outcome)
	}
}

fn distinct_assets(tx: &UniversalTransaction) -> Vec<Currency> {
	let mut assets: Vec<Currency> = tx
		.movements
		.inflows
		.iter()
		.chain(tx.movements.outflows.iter())
		.map(|m| m.asset.clone())
		.collect();
	assets.sort();
	assets.dedup();
	assets
}

fn build_transaction(
	source: &str,
	group_key: &str,
	interpreted: &InterpretedGroup,
	group_rows: &[&RawRecord],
) -> Result<UniversalTransaction, ProcessorError> {
	let first = group_rows.first().ok_or_else(|| ProcessorError::Fatal {
		first_row_id: Uuid::nil(),
		message: "empty group passed to build_transaction".to_string(),
	})?;

	let operation = classify_operation(interpreted);
	let datetime: DateTime<Utc> = first.created_at;

	Ok(UniversalTransaction {
		id: Uuid::new_v4(),
		external_id: group_key.to_string(),
		source: source.to_string(),
		source_type: first.source_type,
		datetime,
		timestamp: datetime.timestamp(),
		status: TxStatus::Success,
		operation,
		movements: Movements { inflows: interpreted.inflows.clone(), outflows: interpreted.outflows.clone() },
		fees: interpreted.fees.clone(),
		blockchain: blockchain_of(group_rows),
		note: None,
		metadata: HashMap::new(),
	})
}

fn blockchain_of(group_rows: &[&RawRecord]) -> Option<Blockchain> {
	let row = group_rows.first()?;
	let payload = row.interpretable_payload()?;
	let hash = payload.get("hash")?.as_str()?.to_string();
	Some(Blockchain { name: row.provider_name.clone(), height: None, hash: Some(hash), confirmed: true })
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::{ProcessedState, SourceType, StreamType};
	use rust_decimal_macros::dec;

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
	fn builds_a_transaction_from_an_interpreted_group() {
		let principal = row(1, serde_json::json!({"amount": "-0.00648264", "asset": "BTC"}));
		let rows = vec![&principal];
		let mut group = InterpretedGroup::default();
		group.outflows.push(ledgerflow_types::AssetMovement::new("BTC", dec!(0.00648264), dec!(0.00648264)));

		let tx = build_transaction("kraken", "R1", &group, &rows).unwrap();
		assert_eq!(tx.external_id, "R1");
		assert_eq!(tx.source, "kraken");
		assert_eq!(tx.operation.op_type, "withdrawal");
	}
}
