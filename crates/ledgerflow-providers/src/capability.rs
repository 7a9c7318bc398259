use ledgerflow_types::CursorType;
use serde::{Deserialize, Serialize};

/// One-shot and streaming operations a provider client may expose. Kept as
/// a plain enum (a "tagged variant," per spec §9) rather than a trait per
/// operation, so the registry can match capabilities without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
	GetAddressBalances,
	GetAddressTokenBalances,
	HasAddressTransactions,
	StreamTransactions,
	StreamTokenTransfers,
	StreamLedger,
}

impl Operation {
	/// Idempotency key used by the response cache (spec §4.2:
	/// `op.getCacheKey(op)`). One-shot operations that depend only on the
	/// account identifier are safe to memoise; streaming operations are
	/// never cached (their result depends on an evolving cursor).
	pub fn cache_key(&self, account_identifier: &str) -> Option<String> {
		match self {
			Operation::GetAddressBalances
			| Operation::GetAddressTokenBalances
			| Operation::HasAddressTransactions => {
				Some(format!("{:?}:{account_identifier}", self))
			}
			Operation::StreamTransactions | Operation::StreamTokenTransfers | Operation::StreamLedger => None,
		}
	}
}

/// How far back a cursor must be shifted when a new provider takes over a
/// stream, so that at-least-once delivery holds across the seam (spec §4.4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReplayWindow {
	pub blocks: Option<u64>,
	pub minutes: Option<i64>,
	pub records: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
	pub requests_per_second: Option<u32>,
	pub requests_per_minute: Option<u32>,
	pub requests_per_hour: Option<u32>,
	pub burst_limit: Option<u32>,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			requests_per_second: Some(5),
			requests_per_minute: None,
			requests_per_hour: None,
			burst_limit: Some(5),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ClientDefaults {
	pub rate_limit: RateLimitConfig,
	pub retries: u32,
	pub timeout: std::time::Duration,
}

impl Default for ClientDefaults {
	fn default() -> Self {
		Self {
			rate_limit: RateLimitConfig::default(),
			retries: 3,
			timeout: std::time::Duration::from_secs(10),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Capabilities {
	pub supported_operations: Vec<Operation>,
	pub supported_cursor_types: Vec<CursorType>,
	pub preferred_cursor_type: CursorType,
	pub replay_window: ReplayWindow,
}

impl Capabilities {
	pub fn supports(&self, op: Operation) -> bool {
		self.supported_operations.contains(&op)
	}
}

/// Declarative metadata registered for each provider (spec §4.1). Clients
/// are constructed separately (they hold live HTTP connections); this is
/// just the data the registry and failover engine reason about.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
	pub name: String,
	/// Blockchain name for on-chain providers, exchange name for CEX
	/// providers — used as half of the circuit breaker key
	/// `(blockchain, providerName)`.
	pub blockchain_or_exchange: String,
	pub base_url: String,
	pub requires_api_key: bool,
	pub api_key_env_var: Option<String>,
	pub capabilities: Capabilities,
	pub defaults: ClientDefaults,
	/// Higher priority wins ties in the failover engine's candidate scoring.
	pub priority: u32,
}
