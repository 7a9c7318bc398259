use ledgerflow_types::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

/// Records raw rows the scam/dust filter (C10) decided to exclude from
/// processing, rather than silently dropping them, so the original raw row
/// stays in the audit trail with a reason attached (spec §6
/// `excluded_transactions`).
#[derive(Clone)]
pub struct ExcludedTransactionStore {
	pool: PgPool,
}

impl ExcludedTransactionStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn record(
		&self,
		account_id: Uuid,
		raw_data_id: Uuid,
		reason: &str,
		classifier_name: Option<&str>,
	) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO excluded_transactions (id, account_id, raw_data_id, reason, classifier_name) \
			 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (raw_data_id) DO NOTHING",
		)
		.bind(Uuid::new_v4())
		.bind(account_id)
		.bind(raw_data_id)
		.bind(reason)
		.bind(classifier_name)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	pub async fn is_excluded(&self, raw_data_id: Uuid) -> Result<bool, StoreError> {
		let row = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM excluded_transactions WHERE raw_data_id = $1)")
			.bind(raw_data_id)
			.fetch_one(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(row)
	}
}
