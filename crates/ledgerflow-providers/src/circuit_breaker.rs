use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use ledgerflow_types::{CircuitState, ProviderHealth};

/// Tunables for one circuit breaker key. Defaults follow spec §9's
/// per-source tolerance table in spirit (stricter sources get a lower
/// failure threshold).
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
	pub failure_threshold: u32,
	pub error_rate_threshold: f64,
	pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 5,
			error_rate_threshold: 0.5,
			cooldown: Duration::from_secs(30),
		}
	}
}

/// Circuit breaker keyed by `(blockchain_or_exchange, provider_name)` (spec
/// §4.2). Shared, read-mostly state guarded by per-key locking via
/// `DashMap`, following the "fine-grained locking, no global singleton"
/// guidance in spec §9.
pub struct CircuitBreaker {
	config: CircuitBreakerConfig,
	health: DashMap<String, ProviderHealth>,
}

fn key(blockchain_or_exchange: &str, provider_name: &str) -> String {
	format!("{blockchain_or_exchange}:{provider_name}")
}

impl CircuitBreaker {
	pub fn new(config: CircuitBreakerConfig) -> Self {
		Self { config, health: DashMap::new() }
	}

	pub fn health(&self, blockchain_or_exchange: &str, provider_name: &str) -> ProviderHealth {
		self.health
			.entry(key(blockchain_or_exchange, provider_name))
			.or_insert_with(|| ProviderHealth::new(provider_name))
			.clone()
	}

	/// Overwrites a key's in-memory health with a snapshot loaded from
	/// durable storage, so a restarted process doesn't start every circuit
	/// `closed` right after a real outage (spec §5, §6 `provider_stats`).
	pub fn seed(&self, blockchain_or_exchange: &str, provider_name: &str, health: ProviderHealth) {
		self.health.insert(key(blockchain_or_exchange, provider_name), health);
	}

	/// Whether a live request may currently be made. No request is ever
	/// issued against an open circuit whose cool-down has not elapsed (spec
	/// §8 invariant 6).
	pub fn is_request_allowed(&self, blockchain_or_exchange: &str, provider_name: &str) -> bool {
		let mut entry = self
			.health
			.entry(key(blockchain_or_exchange, provider_name))
			.or_insert_with(|| ProviderHealth::new(provider_name));
		let now = Utc::now();
		if let CircuitState::Open { until } = entry.circuit_state {
			if now >= until {
				entry.circuit_state = CircuitState::HalfOpen;
			}
		}
		entry.circuit_state.is_request_allowed(now)
	}

	pub fn record_success(&self, blockchain_or_exchange: &str, provider_name: &str, response_ms: f64) {
		let mut entry = self
			.health
			.entry(key(blockchain_or_exchange, provider_name))
			.or_insert_with(|| ProviderHealth::new(provider_name));
		entry.consecutive_failures = 0;
		entry.total_successes += 1;
		entry.is_healthy = true;
		entry.last_checked_at = Utc::now();
		entry.avg_response_ms = (entry.avg_response_ms * 0.8) + (response_ms * 0.2);
		// A probing success while half-open closes the circuit (spec §8
		// invariant 6).
		if matches!(entry.circuit_state, CircuitState::HalfOpen) {
			entry.circuit_state = CircuitState::Closed;
		}
	}

	pub fn record_failure(&self, blockchain_or_exchange: &str, provider_name: &str, error: impl Into<String>) {
		let mut entry = self
			.health
			.entry(key(blockchain_or_exchange, provider_name))
			.or_insert_with(|| ProviderHealth::new(provider_name));
		entry.consecutive_failures += 1;
		entry.total_failures += 1;
		entry.last_error = Some(error.into());
		entry.last_checked_at = Utc::now();

		let total = entry.total_successes + entry.total_failures;
		let error_rate = if total == 0 { 0.0 } else { entry.total_failures as f64 / total as f64 };

		let should_open = entry.consecutive_failures >= self.config.failure_threshold
			|| (total >= 10 && error_rate > self.config.error_rate_threshold);

		if should_open {
			entry.is_healthy = false;
			entry.circuit_state = CircuitState::Open { until: Utc::now() + self.config.cooldown };
		} else if matches!(entry.circuit_state, CircuitState::HalfOpen) {
			// A failed probe re-opens the circuit for another full cooldown.
			entry.circuit_state = CircuitState::Open { until: Utc::now() + self.config.cooldown };
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opens_after_threshold_consecutive_failures() {
		let cb = CircuitBreaker::new(CircuitBreakerConfig { failure_threshold: 3, ..Default::default() });
		for _ in 0..2 {
			cb.record_failure("bitcoin", "alpha", "timeout");
			assert!(cb.is_request_allowed("bitcoin", "alpha"));
		}
		cb.record_failure("bitcoin", "alpha", "timeout");
		assert!(!cb.is_request_allowed("bitcoin", "alpha"));
	}

	#[test]
	fn half_open_probe_success_closes_circuit() {
		let cb = CircuitBreaker::new(CircuitBreakerConfig {
			failure_threshold: 1,
			cooldown: Duration::from_secs(0),
			..Default::default()
		});
		cb.record_failure("bitcoin", "alpha", "boom");
		assert!(cb.is_request_allowed("bitcoin", "alpha"));
		assert!(matches!(cb.health("bitcoin", "alpha").circuit_state, CircuitState::HalfOpen));
		cb.record_success("bitcoin", "alpha", 50.0);
		assert!(matches!(cb.health("bitcoin", "alpha").circuit_state, CircuitState::Closed));
	}

	#[test]
	fn failed_probe_reopens_circuit() {
		let cb = CircuitBreaker::new(CircuitBreakerConfig {
			failure_threshold: 1,
			cooldown: Duration::from_secs(0),
			..Default::default()
		});
		cb.record_failure("bitcoin", "alpha", "boom");
		assert!(cb.is_request_allowed("bitcoin", "alpha"));
		cb.record_failure("bitcoin", "alpha", "boom again");
		assert!(matches!(cb.health("bitcoin", "alpha").circuit_state, CircuitState::Open { .. }));
	}
}
