use async_trait::async_trait;
use ledgerflow_types::Cursor;
use serde_json::Value;
use thiserror::Error;

use crate::capability::{Capabilities, Operation};

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("request to {provider} failed: {message}")]
	Transport { provider: String, message: String },

	#[error("response from {provider} failed schema validation at {schema_path}: {message}")]
	SchemaValidation { provider: String, schema_path: String, message: String },

	#[error("operation {0:?} not supported by this client")]
	UnsupportedOperation(Operation),

	#[error("request to {provider} timed out after {timeout_ms}ms")]
	Timeout { provider: String, timeout_ms: u64 },
}

/// A response validated against its declared schema and wrapped with its
/// raw payload (spec §4.1: "each response is validated against a declared
/// schema before being wrapped as a typed record `{ raw, normalized }`").
#[derive(Debug, Clone)]
pub struct TypedRecord {
	pub raw: Value,
	pub normalized: Value,
}

/// One page of a streaming operation.
#[derive(Debug, Clone)]
pub struct BatchResult {
	pub data: Vec<TypedRecord>,
	pub cursor: Cursor,
	pub is_complete: bool,
	/// Records the provider returned in this page, before duplicate
	/// suppression (spec §4.3 edge cases). Equal to `data.len()` for a
	/// `ProviderClient` implementation, which never dedups; the failover
	/// engine rewrites this pair after its own dedup pass.
	pub fetched: usize,
	/// Records actually present in `data` after duplicate suppression.
	pub yielded: usize,
}

/// The uniform operation interface every provider client exposes (spec
/// §4.1). Implementations are pure over HTTP plus a schema validator — no
/// retry/rate-limit/circuit-breaker logic belongs here; that lives one
/// layer up in `ledgerflow-ingest`, the way the teacher keeps `BtcRpcClient`
/// (raw RPC calls) separate from `BtcRetryRpcClient` (the retrying
/// wrapper).
#[async_trait]
pub trait ProviderClient: Send + Sync {
	fn name(&self) -> &str;

	fn capabilities(&self) -> &Capabilities;

	async fn execute(&self, op: Operation, account_identifier: &str) -> Result<TypedRecord, ClientError>;

	async fn execute_streaming_batch(
		&self,
		op: Operation,
		account_identifier: &str,
		resume_cursor: Option<&Cursor>,
	) -> Result<BatchResult, ClientError>;

	/// Extracts the universal (transferable) cursor alternatives from a
	/// fetched record, for storage alongside the provider's own page token.
	fn extract_cursors(&self, record: &TypedRecord) -> Vec<ledgerflow_types::Cursor>;

	/// Shifts a transferable cursor backward by this provider's configured
	/// replay window (spec §4.4).
	fn apply_replay_window(&self, cursor: Cursor) -> Cursor;

	async fn is_healthy(&self) -> bool;
}
