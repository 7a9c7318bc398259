use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use dashmap::DashMap;
use futures::Stream;
use ledgerflow_providers::{
	BatchResult, CircuitBreaker, Operation, ProviderClient, ProviderMetadata, ProviderRateLimiter,
	ProviderRegistry, ResponseCache, TypedRecord,
};
use ledgerflow_store::ProviderStatsStore;
use ledgerflow_types::{Cursor, ProviderError};

use crate::dedup::DedupWindow;

/// Combines the registry, rate limiter, circuit breaker and response cache
/// into the one-shot and streaming failover paths described in spec §4.3.
/// Candidate ordering, cache/circuit/timeout gating and cascading retry all
/// live here rather than in `ProviderClient` implementations, the same
/// separation the teacher keeps between its raw RPC clients and its
/// `retrier.rs` wrapper.
pub struct FailoverEngine {
	registry: ProviderRegistry,
	circuit_breaker: CircuitBreaker,
	cache: ResponseCache,
	rate_limiters: DashMap<String, Arc<ProviderRateLimiter>>,
	/// Durable mirror of circuit breaker state (spec §5, §6). `None` in
	/// tests and anywhere persistence isn't wired up; the in-memory breaker
	/// stays authoritative either way.
	stats_store: Option<ProviderStatsStore>,
}

impl FailoverEngine {
	pub fn new(registry: ProviderRegistry, circuit_breaker: CircuitBreaker, cache: ResponseCache) -> Self {
		Self { registry, circuit_breaker, cache, rate_limiters: DashMap::new(), stats_store: None }
	}

	/// Attaches durable persistence for circuit breaker state transitions.
	/// Call `seed_health` beforehand to restore state saved by a prior run.
	pub fn with_stats_store(mut self, stats_store: ProviderStatsStore) -> Self {
		self.stats_store = Some(stats_store);
		self
	}

	/// Restores every registered provider's last-known health from durable
	/// storage into the in-memory circuit breaker, so a restart doesn't
	/// silently reopen every circuit as `closed` after a real outage (spec
	/// §5, §6). A provider with no saved row is left at its fresh default.
	pub async fn seed_health(&self, stats_store: &ProviderStatsStore) -> Result<(), ProviderError> {
		for metadata in self.registry.all() {
			if let Some(health) = stats_store
				.load(&metadata.blockchain_or_exchange, &metadata.name)
				.await
				.map_err(|e| ProviderError::Transient { provider: metadata.name.clone(), message: e.to_string() })?
			{
				self.circuit_breaker.seed(&metadata.blockchain_or_exchange, &metadata.name, health);
			}
		}
		Ok(())
	}

	/// Fire-and-forget persistence of one key's current health, so the
	/// retry/streaming hot path never blocks on a database write.
	fn persist_health(&self, blockchain_or_exchange: &str, provider_name: &str) {
		let Some(store) = self.stats_store.clone() else { return };
		let health = self.circuit_breaker.health(blockchain_or_exchange, provider_name);
		let blockchain_or_exchange = blockchain_or_exchange.to_string();
		tokio::spawn(async move {
			if let Err(err) = store.save(&blockchain_or_exchange, &health).await {
				tracing::warn!(provider = %health.provider_key, error = %err, "failed to persist provider health");
			}
		});
	}

	fn rate_limiter_for(&self, metadata: &ProviderMetadata) -> Arc<ProviderRateLimiter> {
		if let Some(limiter) = self.rate_limiters.get(&metadata.name) {
			return limiter.clone();
		}
		let limiter = Arc::new(ProviderRateLimiter::new(&metadata.defaults.rate_limit));
		self.rate_limiters.insert(metadata.name.clone(), limiter.clone());
		limiter
	}

	/// Ranks candidates by a live composite score — `health × circuit-state ×
	/// priority` (spec §4.3; capability-match is already 1.0 for anything
	/// `candidates_for` returns, since it pre-filters on supported
	/// operations) — then, if `preferred_provider` names a candidate still
	/// present in the list, moves it to the front regardless of score.
	fn rank_candidates(
		&self,
		blockchain_or_exchange: &str,
		preferred_provider: Option<&str>,
		mut candidates: Vec<(ProviderMetadata, Arc<dyn ProviderClient>)>,
	) -> Vec<(ProviderMetadata, Arc<dyn ProviderClient>)> {
		candidates.sort_by(|(a, _), (b, _)| {
			let score_a = self.health(blockchain_or_exchange, a).score() * a.priority as f64;
			let score_b = self.health(blockchain_or_exchange, b).score() * b.priority as f64;
			score_b.total_cmp(&score_a)
		});

		if let Some(preferred) = preferred_provider {
			if let Some(pos) = candidates.iter().position(|(metadata, _)| metadata.name == preferred) {
				let entry = candidates.remove(pos);
				candidates.insert(0, entry);
			}
		}

		candidates
	}

	fn health(&self, blockchain_or_exchange: &str, metadata: &ProviderMetadata) -> ledgerflow_types::ProviderHealth {
		self.circuit_breaker.health(blockchain_or_exchange, &metadata.name)
	}

	/// Runs a one-shot operation (balances, token balances, has-transactions)
	/// against ranked candidates, skipping any whose circuit is open and
	/// sharing an in-flight cached fetch across concurrent callers for
	/// cacheable operations (spec §4.2, §4.3). `preferred_provider`, when it
	/// names a candidate that supports `op`, is tried first regardless of its
	/// live score (spec §4.3 "preferred provider override").
	pub async fn execute_once(
		&self,
		op: Operation,
		blockchain_or_exchange: &str,
		account_identifier: &str,
		preferred_provider: Option<&str>,
	) -> Result<TypedRecord, ProviderError> {
		let candidates: Vec<(ProviderMetadata, Arc<dyn ProviderClient>)> = self
			.registry
			.candidates_for(blockchain_or_exchange, op)
			.into_iter()
			.map(|(m, c)| (m.clone(), c.clone()))
			.collect();
		if candidates.is_empty() {
			return Err(ProviderError::NoCompatibleProvider { operation: format!("{op:?}") });
		}
		let candidates = self.rank_candidates(blockchain_or_exchange, preferred_provider, candidates);

		let mut last_error = None;

		for (metadata, client) in &candidates {
			if !self.circuit_breaker.is_request_allowed(blockchain_or_exchange, &metadata.name) {
				last_error = Some(format!("{} circuit open", metadata.name));
				continue;
			}

			let limiter = self.rate_limiter_for(metadata);
			limiter.acquire().await;

			let fetch = || async {
				let started = Instant::now();
				match tokio::time::timeout(metadata.defaults.timeout, client.execute(op, account_identifier)).await {
					Ok(Ok(record)) => {
						self.circuit_breaker.record_success(
							blockchain_or_exchange,
							&metadata.name,
							started.elapsed().as_millis() as f64,
						);
						self.persist_health(blockchain_or_exchange, &metadata.name);
						Ok(serde_json::json!({ "raw": record.raw, "normalized": record.normalized }))
					}
					Ok(Err(err)) => {
						self.circuit_breaker.record_failure(blockchain_or_exchange, &metadata.name, err.to_string());
						self.persist_health(blockchain_or_exchange, &metadata.name);
						Err(err.to_string())
					}
					Err(_) => {
						self.circuit_breaker.record_failure(blockchain_or_exchange, &metadata.name, "timeout");
						self.persist_health(blockchain_or_exchange, &metadata.name);
						Err(format!("timed out after {}ms", metadata.defaults.timeout.as_millis()))
					}
				}
			};

			let outcome = match op.cache_key(account_identifier) {
				Some(key) => self.cache.get_or_fetch(&format!("{}:{key}", metadata.name), fetch).await,
				None => fetch().await,
			};

			match outcome {
				Ok(value) => {
					return Ok(TypedRecord { raw: value["raw"].clone(), normalized: value["normalized"].clone() });
				}
				Err(err) => {
					tracing::warn!(provider = %metadata.name, error = %err, "provider call failed, trying next candidate");
					last_error = Some(err);
				}
			}
		}

		Err(ProviderError::AllProvidersFailed {
			operation: format!("{op:?}"),
			last_error: last_error.unwrap_or_else(|| "no candidates were eligible".to_string()),
		})
	}

	/// Streams batches for `op` starting from `resume_cursor`, failing over
	/// to the next compatible candidate on error and reapplying that
	/// candidate's replay window across the handoff (spec §4.3 steps 1-5,
	/// §4.4). Duplicate `eventId`s introduced by the replayed window are
	/// suppressed via `dedup_window`-sized seen-set; a batch is always
	/// yielded even if dedup empties it, so callers can still observe
	/// cursor/completion progress. `preferred_provider`, when it names a
	/// candidate that supports `op`, is tried first (spec §4.3 "preferred
	/// provider override").
	pub fn stream_batches(
		self: Arc<Self>,
		op: Operation,
		blockchain_or_exchange: String,
		account_identifier: String,
		resume_cursor: Option<Cursor>,
		dedup_window: usize,
		preferred_provider: Option<String>,
	) -> impl Stream<Item = Result<BatchResult, ProviderError>> {
		stream! {
			let mut dedup = DedupWindow::new(dedup_window);
			let mut cursor = resume_cursor;

			let candidates: Vec<(ProviderMetadata, Arc<dyn ProviderClient>)> = self
				.registry
				.candidates_for(&blockchain_or_exchange, op)
				.into_iter()
				.map(|(m, c)| (m.clone(), c.clone()))
				.collect();

			if candidates.is_empty() {
				yield Err(ProviderError::NoCompatibleProvider { operation: format!("{op:?}") });
				return;
			}
			let mut candidates = self.rank_candidates(&blockchain_or_exchange, preferred_provider.as_deref(), candidates);

			if let Some(ref c) = cursor {
				candidates.retain(|(metadata, _)| {
					c.resumable_by(&metadata.name, &metadata.capabilities.supported_cursor_types)
				});
				if candidates.is_empty() {
					yield Err(ProviderError::NoCompatibleProvider { operation: format!("{op:?}") });
					return;
				}
			}

			let mut last_error = None;
			let mut candidates = candidates.into_iter();

			'providers: while let Some((metadata, client)) = candidates.next() {
				if !self.circuit_breaker.is_request_allowed(&blockchain_or_exchange, &metadata.name) {
					last_error = Some(format!("{} circuit open", metadata.name));
					continue;
				}
				let limiter = self.rate_limiter_for(&metadata);

				if let Some(ref mut c) = cursor {
					if c.meta.provider_name != metadata.name {
						if let Some(pos) = c.best_transferable().cloned() {
							c.primary = pos;
						}
						*c = client.apply_replay_window(c.clone());
						if let Some(last_record_id) = &c.last_record_id {
							dedup.seed(last_record_id);
						}
					}
				}

				loop {
					limiter.acquire().await;
					let started = Instant::now();
					let attempt = tokio::time::timeout(
						metadata.defaults.timeout,
						client.execute_streaming_batch(op, &account_identifier, cursor.as_ref()),
					)
					.await;

					let batch = match attempt {
						Ok(Ok(batch)) => {
							self.circuit_breaker.record_success(
								&blockchain_or_exchange,
								&metadata.name,
								started.elapsed().as_millis() as f64,
							);
							self.persist_health(&blockchain_or_exchange, &metadata.name);
							batch
						}
						Ok(Err(err)) => {
							self.circuit_breaker.record_failure(&blockchain_or_exchange, &metadata.name, err.to_string());
							self.persist_health(&blockchain_or_exchange, &metadata.name);
							last_error = Some(err.to_string());
							tracing::warn!(provider = %metadata.name, error = %err, "streaming batch failed, failing over");
							continue 'providers;
						}
						Err(_) => {
							self.circuit_breaker.record_failure(&blockchain_or_exchange, &metadata.name, "timeout");
							self.persist_health(&blockchain_or_exchange, &metadata.name);
							last_error = Some("timed out".to_string());
							continue 'providers;
						}
					};

					let fetched = batch.data.len();
					let deduped: Vec<TypedRecord> = batch
						.data
						.into_iter()
						.filter(|record| match record.normalized.get("eventId").and_then(|v| v.as_str()) {
							Some(event_id) => dedup.admit(event_id),
							None => true,
						})
						.collect();

					let is_complete = batch.is_complete;
					let yielded = deduped.len();
					cursor = Some(batch.cursor.clone());

					// Empty non-completion batches carry no new information and
					// are dropped rather than yielded (spec §4.3 edge cases);
					// the cursor above still advances so the next fetch moves on.
					if !is_complete && deduped.is_empty() {
						tracing::debug!(provider = %metadata.name, fetched, "dropping empty non-completion batch");
						continue;
					}

					yield Ok(BatchResult { data: deduped, cursor: batch.cursor, is_complete, fetched, yielded });

					if is_complete {
						return;
					}
				}
			}

			yield Err(ProviderError::AllProvidersFailed {
				operation: format!("{op:?}"),
				last_error: last_error.unwrap_or_else(|| "no candidates were eligible".to_string()),
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use futures_util::pin_mut;
	use futures_util::StreamExt;
	use ledgerflow_providers::{Capabilities, ClientDefaults, ClientError, RateLimitConfig};
	use ledgerflow_types::{CursorMeta, CursorPosition, CursorType};
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::time::Duration;

	fn metadata(name: &str, priority: u32) -> ProviderMetadata {
		ProviderMetadata {
			name: name.to_string(),
			blockchain_or_exchange: "bitcoin".to_string(),
			base_url: "https://example.invalid".to_string(),
			requires_api_key: false,
			api_key_env_var: None,
			capabilities: Capabilities {
				supported_operations: vec![Operation::GetAddressBalances, Operation::StreamTransactions],
				supported_cursor_types: vec![CursorType::BlockNumber],
				preferred_cursor_type: CursorType::BlockNumber,
				replay_window: Default::default(),
			},
			defaults: ClientDefaults {
				rate_limit: RateLimitConfig {
					requests_per_second: Some(1000),
					requests_per_minute: None,
					requests_per_hour: None,
					burst_limit: Some(50),
				},
				retries: 0,
				timeout: Duration::from_secs(5),
			},
			priority,
		}
	}

	struct FlakyThenOkClient {
		name: String,
		fail_times: AtomicU32,
	}

	#[async_trait]
	impl ProviderClient for FlakyThenOkClient {
		fn name(&self) -> &str {
			&self.name
		}

		fn capabilities(&self) -> &Capabilities {
			unimplemented!("not exercised in these tests")
		}

		async fn execute(&self, _op: Operation, _account_identifier: &str) -> Result<TypedRecord, ClientError> {
			if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
				Err(ClientError::Transport { provider: self.name.clone(), message: "boom".to_string() })
			} else {
				Ok(TypedRecord { raw: serde_json::json!({}), normalized: serde_json::json!({"ok": true, "servedBy": self.name}) })
			}
		}

		async fn execute_streaming_batch(
			&self,
			_op: Operation,
			_account_identifier: &str,
			_resume_cursor: Option<&Cursor>,
		) -> Result<BatchResult, ClientError> {
			Err(ClientError::Transport { provider: self.name.clone(), message: "always fails".to_string() })
		}

		fn extract_cursors(&self, _record: &TypedRecord) -> Vec<Cursor> {
			Vec::new()
		}

		fn apply_replay_window(&self, cursor: Cursor) -> Cursor {
			cursor
		}

		async fn is_healthy(&self) -> bool {
			true
		}
	}

	fn engine_with(clients: Vec<(&str, u32, u32)>) -> FailoverEngine {
		let mut registry = ProviderRegistry::new();
		for (name, priority, fail_times) in clients {
			registry.register(
				metadata(name, priority),
				Arc::new(FlakyThenOkClient { name: name.to_string(), fail_times: AtomicU32::new(fail_times) }),
			);
		}
		FailoverEngine::new(registry, CircuitBreaker::new(Default::default()), ResponseCache::new(Duration::from_secs(60)))
	}

	#[tokio::test]
	async fn execute_once_fails_over_to_next_candidate() {
		let engine = engine_with(vec![("alpha", 10, 99), ("beta", 1, 0)]);
		let record = engine.execute_once(Operation::GetAddressBalances, "bitcoin", "addr-1", None).await.unwrap();
		assert_eq!(record.normalized["ok"], serde_json::json!(true));
	}

	#[tokio::test]
	async fn execute_once_exhausts_to_all_providers_failed() {
		let engine = engine_with(vec![("alpha", 10, 99), ("beta", 1, 99)]);
		let err = engine.execute_once(Operation::GetAddressBalances, "bitcoin", "addr-1", None).await.unwrap_err();
		assert!(matches!(err, ProviderError::AllProvidersFailed { .. }));
	}

	#[tokio::test]
	async fn execute_once_with_no_candidates_is_no_compatible_provider() {
		let engine = engine_with(vec![]);
		let err = engine.execute_once(Operation::GetAddressBalances, "bitcoin", "addr-1", None).await.unwrap_err();
		assert!(matches!(err, ProviderError::NoCompatibleProvider { .. }));
	}

	#[tokio::test]
	async fn execute_once_honours_preferred_provider_override() {
		let engine = engine_with(vec![("alpha", 1, 0), ("beta", 10, 0)]);
		// beta outranks alpha on priority alone, but alpha is explicitly preferred.
		let record = engine
			.execute_once(Operation::GetAddressBalances, "bitcoin", "addr-1", Some("alpha"))
			.await
			.unwrap();
		assert_eq!(record.normalized["servedBy"], serde_json::json!("alpha"));
	}

	#[tokio::test]
	async fn stream_batches_exhausts_when_every_candidate_errors() {
		let engine = Arc::new(engine_with(vec![("alpha", 10, 0), ("beta", 1, 0)]));
		let meta = CursorMeta { provider_name: "alpha".to_string(), updated_at: chrono::Utc::now(), is_complete: None };
		let cursor = Cursor::new(CursorPosition::universal(CursorType::BlockNumber, "100"), meta);

		let s = engine.stream_batches(
			Operation::StreamTransactions,
			"bitcoin".to_string(),
			"addr-1".to_string(),
			Some(cursor),
			16,
			None,
		);
		pin_mut!(s);

		let first = s.next().await.unwrap();
		assert!(matches!(first, Err(ProviderError::AllProvidersFailed { .. })));
	}
}
