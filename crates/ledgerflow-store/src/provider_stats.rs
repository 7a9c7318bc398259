use ledgerflow_types::{CircuitState, ProviderHealth, StoreError};
use sqlx::PgPool;
use sqlx::Row;

/// Durable snapshot of `ProviderHealth` (spec §6 `provider_stats`). The
/// in-memory `CircuitBreaker` in `ledgerflow-providers` is authoritative
/// within a process; this table exists so a restarted engine doesn't start
/// every circuit `closed` immediately after a real outage.
#[derive(Clone)]
pub struct ProviderStatsStore {
	pool: PgPool,
}

impl ProviderStatsStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn save(&self, blockchain_or_exchange: &str, health: &ProviderHealth) -> Result<(), StoreError> {
		let circuit_state = serde_json::to_value(&health.circuit_state).map_err(|e| StoreError::Db(e.to_string()))?;
		sqlx::query(
			"INSERT INTO provider_stats \
			 (blockchain_or_exchange, provider_name, is_healthy, consecutive_failures, total_successes, total_failures, avg_response_ms, last_error, last_checked_at, circuit_state) \
			 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
			 ON CONFLICT (blockchain_or_exchange, provider_name) DO UPDATE SET \
			 is_healthy = EXCLUDED.is_healthy, consecutive_failures = EXCLUDED.consecutive_failures, \
			 total_successes = EXCLUDED.total_successes, total_failures = EXCLUDED.total_failures, \
			 avg_response_ms = EXCLUDED.avg_response_ms, last_error = EXCLUDED.last_error, \
			 last_checked_at = EXCLUDED.last_checked_at, circuit_state = EXCLUDED.circuit_state",
		)
		.bind(blockchain_or_exchange)
		.bind(&health.provider_key)
		.bind(health.is_healthy)
		.bind(health.consecutive_failures as i32)
		.bind(health.total_successes as i64)
		.bind(health.total_failures as i64)
		.bind(health.avg_response_ms)
		.bind(&health.last_error)
		.bind(health.last_checked_at)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	pub async fn load(&self, blockchain_or_exchange: &str, provider_name: &str) -> Result<Option<ProviderHealth>, StoreError> {
		let row = sqlx::query(
			"SELECT provider_name, is_healthy, consecutive_failures, total_successes, total_failures, \
			 avg_response_ms, last_error, last_checked_at, circuit_state \
			 FROM provider_stats WHERE blockchain_or_exchange = $1 AND provider_name = $2",
		)
		.bind(blockchain_or_exchange)
		.bind(provider_name)
		.fetch_optional(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		let Some(row) = row else { return Ok(None) };
		let circuit_state_json: serde_json::Value = row.try_get("circuit_state").map_err(|e| StoreError::Db(e.to_string()))?;
		let circuit_state: CircuitState = serde_json::from_value(circuit_state_json).map_err(|e| StoreError::Db(e.to_string()))?;
		let consecutive_failures: i32 = row.try_get("consecutive_failures").map_err(|e| StoreError::Db(e.to_string()))?;
		let total_successes: i64 = row.try_get("total_successes").map_err(|e| StoreError::Db(e.to_string()))?;
		let total_failures: i64 = row.try_get("total_failures").map_err(|e| StoreError::Db(e.to_string()))?;

		Ok(Some(ProviderHealth {
			provider_key: row.try_get("provider_name").map_err(|e| StoreError::Db(e.to_string()))?,
			is_healthy: row.try_get("is_healthy").map_err(|e| StoreError::Db(e.to_string()))?,
			consecutive_failures: consecutive_failures as u32,
			total_successes: total_successes as u64,
			total_failures: total_failures as u64,
			avg_response_ms: row.try_get("avg_response_ms").map_err(|e| StoreError::Db(e.to_string()))?,
			last_error: row.try_get("last_error").map_err(|e| StoreError::Db(e.to_string()))?,
			last_checked_at: row.try_get("last_checked_at").map_err(|e| StoreError::Db(e.to_string()))?,
			circuit_state,
		}))
	}
}
