use thiserror::Error;
use uuid::Uuid;

/// Errors raised by provider clients, the rate limiter, circuit breaker and
/// the failover engine (components C1–C4).
#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("response from provider {provider} failed schema validation at {schema_path}: {message}")]
	Validation { provider: String, schema_path: String, message: String },

	#[error("transient error from provider {provider}: {message}")]
	Transient { provider: String, message: String },

	#[error("provider {provider} circuit is open until {retry_after_secs}s from now")]
	CircuitOpen { provider: String, retry_after_secs: u64 },

	#[error("all candidate providers failed for operation {operation}; last error: {last_error}")]
	AllProvidersFailed { operation: String, last_error: String },

	#[error("no provider compatible with the supplied cursor for operation {operation}")]
	NoCompatibleProvider { operation: String },

	#[error("unknown source {0}")]
	UnknownSource(String),
}

/// Errors raised by the raw data / session / transaction stores (C6, C8).
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Db(String),

	#[error("conflicting unique constraint on {table}: {detail}")]
	Conflict { table: String, detail: String },

	#[error("account {account_id} has a non-completed import session; processing refused")]
	SessionNotCompleted { account_id: Uuid },

	#[error("no session in progress for account {account_id}")]
	NoActiveSession { account_id: Uuid },
}

/// Errors raised by the processor / interpretation engine (C7).
#[derive(Debug, Error)]
pub enum ProcessorError {
	#[error("row {row_id} (event {event_id}) failed schema validation at {schema_path}: {message}")]
	Validation { row_id: Uuid, event_id: String, schema_path: String, message: String },

	#[error("zero-sum invariant violated for group {group_key}, asset {asset}: net {net}, tolerance {tolerance}")]
	Integrity { group_key: String, asset: String, net: String, tolerance: String },

	#[error("fatal persistence error while saving batch starting at row {first_row_id}: {message}")]
	Fatal { first_row_id: Uuid, message: String },
}

/// Top-level error surfaced to the orchestrator and, ultimately, to the
/// caller of the engine. Carries enough structure to produce the "first ~5
/// errors" report described in spec §7 without re-parsing strings.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error(transparent)]
	Provider(#[from] ProviderError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Processor(#[from] ProcessorError),

	#[error("{0}")]
	Other(String),
}
