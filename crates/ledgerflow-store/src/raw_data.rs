use chrono::{DateTime, Utc};
use ledgerflow_types::{ProcessedState, RawRecord, StoreError};
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::codec::{processed_state, source_type_from_text, source_type_to_text, stream_type_from_text, stream_type_to_text};

/// How many of a batch's rows were newly written versus already present
/// (the `(account_id, provider_name, event_id)` unique constraint makes a
/// rerun of the same import a no-op — spec §8 invariant 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOutcome {
	pub inserted: u64,
	pub skipped: u64,
}

/// Append-once raw record persistence (spec §4.6, C6). Rows are never
/// updated once written; `mark_processed` only ever sets `processed_at`.
#[derive(Clone)]
pub struct RawDataStore {
	pool: PgPool,
}

impl RawDataStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Starts the transaction a caller commits alongside a session cursor
	/// update, keeping the raw-row insert and the cursor advance atomic.
	pub async fn begin(&self) -> Result<sqlx::Transaction<'_, sqlx::Postgres>, StoreError> {
		self.pool.begin().await.map_err(|e| StoreError::Db(e.to_string()))
	}

	/// Inserts a batch, skipping rows that already exist for
	/// `(account_id, provider_name, event_id)`. Callers run this inside the
	/// same DB transaction as the session cursor update to keep the commit
	/// atomic (spec §4.6, §5 transactional discipline).
	pub async fn insert_batch(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		rows: &[RawRecord],
	) -> Result<InsertOutcome, StoreError> {
		let mut outcome = InsertOutcome::default();
		for row in rows {
			let result = sqlx::query(
				"INSERT INTO raw_data \
				 (id, account_id, provider_name, source_type, event_id, external_id, provider_data, normalized_data, stream_type, created_at) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
				 ON CONFLICT (account_id, provider_name, event_id) DO NOTHING",
			)
			.bind(row.id)
			.bind(row.account_id)
			.bind(&row.provider_name)
			.bind(source_type_to_text(row.source_type))
			.bind(&row.event_id)
			.bind(&row.external_id)
			.bind(&row.provider_data)
			.bind(&row.normalized_data)
			.bind(stream_type_to_text(&row.stream_type))
			.bind(row.created_at)
			.execute(&mut **tx)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;

			if result.rows_affected() == 1 {
				outcome.inserted += 1;
			} else {
				outcome.skipped += 1;
			}
		}
		Ok(outcome)
	}

	/// Up to `limit` pending rows for `account_id`, ordered by `created_at`
	/// so that hash-grouped/correlated rows stay in fetch order within a
	/// chunk (spec §4.7).
	pub async fn pending_for_account(&self, account_id: Uuid, limit: i64) -> Result<Vec<RawRecord>, StoreError> {
		let rows = sqlx::query(
			"SELECT id, account_id, provider_name, source_type, event_id, external_id, \
			 provider_data, normalized_data, stream_type, created_at, processed_at \
			 FROM raw_data WHERE account_id = $1 AND processed_at IS NULL ORDER BY created_at ASC LIMIT $2",
		)
		.bind(account_id)
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		rows.into_iter().map(row_to_record).collect()
	}

	/// Marks rows processed only after their transactions are durably saved
	/// (spec §4.7 persistence discipline). Callers chunk `ids` to ≤ 500.
	pub async fn mark_processed(&self, ids: &[Uuid]) -> Result<(), StoreError> {
		sqlx::query("UPDATE raw_data SET processed_at = now() WHERE id = ANY($1)")
			.bind(ids)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	/// Clears `processed_at` for every row of `account_id`, used by
	/// `reprocess` so the processor reinterprets every raw row from scratch
	/// (spec §4 lifecycle: "`reprocess` deletes transactions and
	/// recomputes"). Rows excluded by the dust/scam filter are left marked
	/// processed — `reprocess` regenerates transactions, not filter verdicts.
	pub async fn reopen_for_account(&self, account_id: Uuid) -> Result<(), StoreError> {
		sqlx::query(
			"UPDATE raw_data SET processed_at = NULL WHERE account_id = $1 \
			 AND id NOT IN (SELECT raw_data_id FROM excluded_transactions WHERE account_id = $1)",
		)
		.bind(account_id)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<RawRecord, StoreError> {
	let source_type: String = row.try_get("source_type").map_err(|e| StoreError::Db(e.to_string()))?;
	let stream_type: String = row.try_get("stream_type").map_err(|e| StoreError::Db(e.to_string()))?;
	let processed_at: Option<DateTime<Utc>> = row.try_get("processed_at").map_err(|e| StoreError::Db(e.to_string()))?;

	Ok(RawRecord {
		id: row.try_get("id").map_err(|e| StoreError::Db(e.to_string()))?,
		account_id: row.try_get("account_id").map_err(|e| StoreError::Db(e.to_string()))?,
		provider_name: row.try_get("provider_name").map_err(|e| StoreError::Db(e.to_string()))?,
		source_type: source_type_from_text(&source_type)?,
		event_id: row.try_get("event_id").map_err(|e| StoreError::Db(e.to_string()))?,
		external_id: row.try_get("external_id").map_err(|e| StoreError::Db(e.to_string()))?,
		provider_data: row.try_get("provider_data").map_err(|e| StoreError::Db(e.to_string()))?,
		normalized_data: row.try_get("normalized_data").map_err(|e| StoreError::Db(e.to_string()))?,
		stream_type: stream_type_from_text(&stream_type)?,
		created_at: row.try_get("created_at").map_err(|e| StoreError::Db(e.to_string()))?,
		processed: processed_state(processed_at),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn processed_state_follows_processed_at() {
		assert_eq!(processed_state(None), ProcessedState::Pending);
		assert_eq!(processed_state(Some(Utc::now())), ProcessedState::Processed);
	}
}
