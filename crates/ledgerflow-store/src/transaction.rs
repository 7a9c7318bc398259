use std::future::Future;

use ledgerflow_types::{Currency, StoreError, UniversalTransaction};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Canonical transaction persistence (spec §4.8, C8). Upsert key is
/// `(source, external_id)`; on conflict the row is updated in place rather
/// than duplicated, so `reprocess` can regenerate bit-identical rows (spec
/// §8 scenario S6).
#[derive(Clone)]
pub struct TransactionRepository {
	pool: PgPool,
}

const MAX_BATCH: usize = 500;

impl TransactionRepository {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Upserts `transactions` in chunks of ≤ 500, one DB transaction per
	/// chunk. A chunk failure aborts the whole call with `StoreError::Db` —
	/// callers treat this as fatal and leave the originating raw rows
	/// `pending` for a retry-safe rerun (spec §4.7, §7).
	pub async fn upsert_batch(&self, transactions: &[UniversalTransaction]) -> Result<(), StoreError> {
		for chunk in transactions.chunks(MAX_BATCH) {
			let mut tx = self.pool.begin().await.map_err(|e| StoreError::Db(e.to_string()))?;
			for t in chunk {
				upsert_one(&mut tx, t).await?;
			}
			tx.commit().await.map_err(|e| StoreError::Db(e.to_string()))?;
		}
		Ok(())
	}

	pub async fn get(&self, source: &str, external_id: &str) -> Result<Option<UniversalTransaction>, StoreError> {
		let row = sqlx::query(
			"SELECT id, source, external_id, source_type, datetime, epoch_seconds, status, \
			 operation_category, operation_type, movements, fees, blockchain, note, metadata \
			 FROM transactions WHERE source = $1 AND external_id = $2",
		)
		.bind(source)
		.bind(external_id)
		.fetch_optional(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		row.map(row_to_transaction).transpose()
	}

	/// Every transaction recorded for `source`, used by `verify-balance` to
	/// reconstruct the ledger's view of an account's balances.
	pub async fn list_by_source(&self, source: &str) -> Result<Vec<UniversalTransaction>, StoreError> {
		let rows = sqlx::query(
			"SELECT id, source, external_id, source_type, datetime, epoch_seconds, status, \
			 operation_category, operation_type, movements, fees, blockchain, note, metadata \
			 FROM transactions WHERE source = $1",
		)
		.bind(source)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		rows.into_iter().map(row_to_transaction).collect()
	}

	/// Deletes every transaction for `source`, used by `reprocess` before
	/// raw rows are reinterpreted (spec §4 lifecycle, §8 scenario S6). Raw
	/// rows are left untouched.
	pub async fn delete_for_source(&self, source: &str) -> Result<u64, StoreError> {
		let result = sqlx::query("DELETE FROM transactions WHERE source = $1")
			.bind(source)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(result.rows_affected())
	}

	/// Fills in `priceAtTxTime` for movements still missing a price,
	/// optionally restricted to `asset_filter` (spec §4.8 price-enrichment
	/// hook). `lookup` resolves a price for `(asset, at)`; rows where it
	/// returns `None` are left unchanged.
	pub async fn enrich_missing_prices<F, Fut>(
		&self,
		asset_filter: Option<&[Currency]>,
		lookup: F,
	) -> Result<u64, StoreError>
	where
		F: Fn(Currency, chrono::DateTime<chrono::Utc>) -> Fut,
		Fut: Future<Output = Option<Decimal>>,
	{
		let rows = sqlx::query(
			"SELECT id, source, external_id, source_type, datetime, epoch_seconds, status, \
			 operation_category, operation_type, movements, fees, blockchain, note, metadata \
			 FROM transactions",
		)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		let mut updated = 0u64;
		for row in rows {
			let mut t = row_to_transaction(row)?;
			let mut changed = false;

			for movement in t.movements.inflows.iter_mut().chain(t.movements.outflows.iter_mut()) {
				if movement.price_at_tx_time.is_some() {
					continue;
				}
				if let Some(filter) = asset_filter {
					if !filter.contains(&movement.asset) {
						continue;
					}
				}
				if let Some(price) = lookup(movement.asset.clone(), t.datetime).await {
					movement.price_at_tx_time = Some(price);
					changed = true;
				}
			}

			if changed {
				let movements_json = serde_json::to_value(&t.movements).map_err(|e| StoreError::Db(e.to_string()))?;
				sqlx::query("UPDATE transactions SET movements = $1 WHERE id = $2")
					.bind(movements_json)
					.bind(t.id)
					.execute(&self.pool)
					.await
					.map_err(|e| StoreError::Db(e.to_string()))?;
				updated += 1;
			}
		}
		Ok(updated)
	}
}

async fn upsert_one(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, t: &UniversalTransaction) -> Result<(), StoreError> {
	let source_type = crate::codec::source_type_to_text(t.source_type);
	let movements = serde_json::to_value(&t.movements).map_err(|e| StoreError::Db(e.to_string()))?;
	let fees = serde_json::to_value(&t.fees).map_err(|e| StoreError::Db(e.to_string()))?;
	let blockchain = serde_json::to_value(&t.blockchain).map_err(|e| StoreError::Db(e.to_string()))?;
	let metadata = serde_json::to_value(&t.metadata).map_err(|e| StoreError::Db(e.to_string()))?;
	let status = match t.status {
		ledgerflow_types::TxStatus::Success => "success",
		ledgerflow_types::TxStatus::Failed => "failed",
		ledgerflow_types::TxStatus::Pending => "pending",
	};
	let category = format!("{:?}", t.operation.category).to_lowercase();

	sqlx::query(
		"INSERT INTO transactions \
		 (id, source, external_id, source_type, datetime, epoch_seconds, status, operation_category, operation_type, movements, fees, blockchain, note, metadata) \
		 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
		 ON CONFLICT (source, external_id) DO UPDATE SET \
		 datetime = EXCLUDED.datetime, status = EXCLUDED.status, operation_category = EXCLUDED.operation_category, \
		 operation_type = EXCLUDED.operation_type, movements = EXCLUDED.movements, fees = EXCLUDED.fees, \
		 blockchain = EXCLUDED.blockchain, note = EXCLUDED.note, metadata = EXCLUDED.metadata",
	)
	.bind(t.id)
	.bind(&t.source)
	.bind(&t.external_id)
	.bind(source_type)
	.bind(t.datetime)
	.bind(t.timestamp)
	.bind(status)
	.bind(category)
	.bind(&t.operation.op_type)
	.bind(movements)
	.bind(fees)
	.bind(blockchain)
	.bind(&t.note)
	.bind(metadata)
	.execute(&mut **tx)
	.await
	.map_err(|e| StoreError::Db(e.to_string()))?;
	Ok(())
}

fn row_to_transaction(row: PgRow) -> Result<UniversalTransaction, StoreError> {
	let source_type: String = row.try_get("source_type").map_err(|e| StoreError::Db(e.to_string()))?;
	let status: String = row.try_get("status").map_err(|e| StoreError::Db(e.to_string()))?;
	let status = match status.as_str() {
		"success" => ledgerflow_types::TxStatus::Success,
		"failed" => ledgerflow_types::TxStatus::Failed,
		"pending" => ledgerflow_types::TxStatus::Pending,
		other => return Err(StoreError::Db(format!("unrecognised transaction status '{other}' in storage"))),
	};
	let category: String = row.try_get("operation_category").map_err(|e| StoreError::Db(e.to_string()))?;
	let category = match category.as_str() {
		"transfer" => ledgerflow_types::OperationCategory::Transfer,
		"trade" => ledgerflow_types::OperationCategory::Trade,
		"stakingreward" | "staking_reward" => ledgerflow_types::OperationCategory::StakingReward,
		"fee" => ledgerflow_types::OperationCategory::Fee,
		_ => ledgerflow_types::OperationCategory::Other,
	};
	let movements_json: serde_json::Value = row.try_get("movements").map_err(|e| StoreError::Db(e.to_string()))?;
	let fees_json: serde_json::Value = row.try_get("fees").map_err(|e| StoreError::Db(e.to_string()))?;
	let blockchain_json: Option<serde_json::Value> = row.try_get("blockchain").map_err(|e| StoreError::Db(e.to_string()))?;
	let metadata_json: serde_json::Value = row.try_get("metadata").map_err(|e| StoreError::Db(e.to_string()))?;

	Ok(UniversalTransaction {
		id: row.try_get("id").map_err(|e| StoreError::Db(e.to_string()))?,
		external_id: row.try_get("external_id").map_err(|e| StoreError::Db(e.to_string()))?,
		source: row.try_get("source").map_err(|e| StoreError::Db(e.to_string()))?,
		source_type: crate::codec::source_type_from_text(&source_type)?,
		datetime: row.try_get("datetime").map_err(|e| StoreError::Db(e.to_string()))?,
		timestamp: row.try_get("epoch_seconds").map_err(|e| StoreError::Db(e.to_string()))?,
		status,
		operation: ledgerflow_types::Operation {
			category,
			op_type: row.try_get("operation_type").map_err(|e| StoreError::Db(e.to_string()))?,
		},
		movements: serde_json::from_value(movements_json).map_err(|e| StoreError::Db(e.to_string()))?,
		fees: serde_json::from_value(fees_json).map_err(|e| StoreError::Db(e.to_string()))?,
		blockchain: blockchain_json.map(serde_json::from_value).transpose().map_err(|e| StoreError::Db(e.to_string()))?,
		note: row.try_get("note").map_err(|e| StoreError::Db(e.to_string()))?,
		metadata: serde_json::from_value(metadata_json).map_err(|e| StoreError::Db(e.to_string()))?,
	})
}
