use ledgerflow_types::StoreError;
use sqlx::PgPool;
use sqlx::Row;

/// Memoised token decimals/symbols, persisted so the in-process cache (C10)
/// doesn't refetch metadata for the same contract on every run (spec §6
/// `token_metadata`).
#[derive(Debug, Clone)]
pub struct TokenMetadata {
	pub symbol: String,
	pub decimals: i32,
}

#[derive(Clone)]
pub struct TokenMetadataStore {
	pool: PgPool,
}

impl TokenMetadataStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn get(&self, blockchain: &str, contract_address: &str) -> Result<Option<TokenMetadata>, StoreError> {
		let row = sqlx::query("SELECT symbol, decimals FROM token_metadata WHERE blockchain = $1 AND contract_address = $2")
			.bind(blockchain)
			.bind(contract_address)
			.fetch_optional(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;

		row.map(|row| {
			Ok(TokenMetadata {
				symbol: row.try_get("symbol").map_err(|e| StoreError::Db(e.to_string()))?,
				decimals: row.try_get("decimals").map_err(|e| StoreError::Db(e.to_string()))?,
			})
		})
		.transpose()
	}

	pub async fn put(&self, blockchain: &str, contract_address: &str, metadata: &TokenMetadata) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO token_metadata (blockchain, contract_address, symbol, decimals) VALUES ($1, $2, $3, $4) \
			 ON CONFLICT (blockchain, contract_address) DO UPDATE SET symbol = EXCLUDED.symbol, decimals = EXCLUDED.decimals, fetched_at = now()",
		)
		.bind(blockchain)
		.bind(contract_address)
		.bind(&metadata.symbol)
		.bind(metadata.decimals)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}
}
