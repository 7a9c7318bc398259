use chrono::{DateTime, Utc};
use ledgerflow_types::{Currency, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::Row;

/// Cached price points consumed by the transaction repository's
/// price-enrichment hook (spec §6 `prices`, §4.8). The price-oracle client
/// itself is out of scope (spec §1); this store only serves as its cache
/// contract.
#[derive(Clone)]
pub struct PriceStore {
	pool: PgPool,
}

impl PriceStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn put(&self, asset: &Currency, quote_asset: &Currency, at: DateTime<Utc>, price: Decimal, source: &str) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO prices (asset, quote_asset, at, price, source) VALUES ($1, $2, $3, $4, $5) \
			 ON CONFLICT (asset, quote_asset, at, source) DO UPDATE SET price = EXCLUDED.price",
		)
		.bind(asset.as_str())
		.bind(quote_asset.as_str())
		.bind(at)
		.bind(price)
		.bind(source)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	/// Nearest cached price at or before `at`, if any.
	pub async fn nearest_before(&self, asset: &Currency, quote_asset: &Currency, at: DateTime<Utc>) -> Result<Option<Decimal>, StoreError> {
		let row = sqlx::query(
			"SELECT price FROM prices WHERE asset = $1 AND quote_asset = $2 AND at <= $3 ORDER BY at DESC LIMIT 1",
		)
		.bind(asset.as_str())
		.bind(quote_asset.as_str())
		.bind(at)
		.fetch_optional(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		row.map(|row| row.try_get("price").map_err(|e| StoreError::Db(e.to_string()))).transpose()
	}
}
