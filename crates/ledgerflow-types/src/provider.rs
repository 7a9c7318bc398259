use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state for one `(blockchain, providerName)` key.
///
/// `Open` carries the instant the circuit may transition to `HalfOpen`; no
/// live request is made against a provider while its circuit is `Open` and
/// that instant has not yet passed (spec §8 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CircuitState {
	Closed,
	Open { until: DateTime<Utc> },
	HalfOpen,
}

impl CircuitState {
	pub fn is_request_allowed(&self, now: DateTime<Utc>) -> bool {
		match self {
			CircuitState::Closed | CircuitState::HalfOpen => true,
			CircuitState::Open { until } => now >= *until,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
	pub provider_key: String,
	pub is_healthy: bool,
	pub consecutive_failures: u32,
	pub total_successes: u64,
	pub total_failures: u64,
	pub avg_response_ms: f64,
	pub last_error: Option<String>,
	pub last_checked_at: DateTime<Utc>,
	pub circuit_state: CircuitState,
}

impl ProviderHealth {
	pub fn new(provider_key: impl Into<String>) -> Self {
		Self {
			provider_key: provider_key.into(),
			is_healthy: true,
			consecutive_failures: 0,
			total_successes: 0,
			total_failures: 0,
			avg_response_ms: 0.0,
			last_error: None,
			last_checked_at: Utc::now(),
			circuit_state: CircuitState::Closed,
		}
	}

	/// A coarse score in `[0, 1]` used by the failover engine's candidate
	/// ranking (spec §4.3: "score = health × circuit-state × priority ×
	/// capability-match").
	pub fn score(&self) -> f64 {
		let circuit_factor = match self.circuit_state {
			CircuitState::Closed => 1.0,
			CircuitState::HalfOpen => 0.5,
			CircuitState::Open { .. } => 0.0,
		};
		let health_factor = if self.is_healthy { 1.0 } else { 0.2 };
		circuit_factor * health_factor
	}
}
