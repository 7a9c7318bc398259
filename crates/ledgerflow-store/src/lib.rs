//! Relational persistence for raw records, import sessions, canonical
//! transactions and their supporting tables (spec §4.6, §4.8, §6).
//!
//! Every repository takes a `sqlx::PgPool` rather than opening its own
//! connections; pooling and connection lifecycle are the caller's concern
//! (the engine crate owns the pool). Queries use the runtime `query`/
//! `query_as` API rather than the `query!` compile-time macros, since this
//! workspace doesn't assume a live database is reachable at build time.

mod account;
mod codec;
mod excluded;
mod prices;
mod provider_stats;
mod raw_data;
mod session;
mod tokens;
mod transaction;

pub use account::AccountStore;
pub use excluded::ExcludedTransactionStore;
pub use prices::PriceStore;
pub use provider_stats::ProviderStatsStore;
pub use raw_data::{InsertOutcome, RawDataStore};
pub use session::SessionStore;
pub use tokens::TokenMetadataStore;
pub use transaction::TransactionRepository;

/// Applies pending migrations. Thin wrapper so callers don't need to depend
/// on `sqlx::migrate!` directly (it resolves `./migrations` relative to this
/// crate at compile time).
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
	sqlx::migrate!("./migrations").run(pool).await
}
