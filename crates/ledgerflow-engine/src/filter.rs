use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use dashmap::DashMap;
use ledgerflow_store::TokenMetadataStore;
use ledgerflow_types::{AssetMovement, Currency, StoreError};
use rust_decimal::Decimal;

pub use ledgerflow_store::TokenMetadata;

/// Why a candidate inflow was excluded from processing, recorded alongside
/// the raw row rather than silently dropped (spec §6 `excluded_transactions`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeReason {
	Dust,
	Scam { classifier_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	Clean,
	Excluded(ExcludeReason),
}

/// Narrow interface for an optional inflow classifier (spec §2 C10). Grounded
/// on the `AnalysisProvider`/`EllipticClient` shape in the teacher's
/// deposit-monitor binary: an HTTP classifier queried per candidate transfer,
/// producing a decision rather than a raw score the caller has to interpret.
#[async_trait]
pub trait DustScamClassifier: Send + Sync {
	fn name(&self) -> &str;
	async fn classify(&self, movement: &AssetMovement) -> Verdict;
}

/// Flags inflows below a per-asset threshold as dust without any network
/// call. Always runs first since it's free; an `HttpScamClassifier` (or any
/// other implementation) can be layered on top for everything dust doesn't
/// already catch.
pub struct DustThresholdClassifier {
	pub thresholds: HashMap<Currency, Decimal>,
}

#[async_trait]
impl DustScamClassifier for DustThresholdClassifier {
	fn name(&self) -> &str {
		"dust-threshold"
	}

	async fn classify(&self, movement: &AssetMovement) -> Verdict {
		match self.thresholds.get(&movement.asset) {
			Some(threshold) if movement.gross_amount.abs() < *threshold => Verdict::Excluded(ExcludeReason::Dust),
			_ => Verdict::Clean,
		}
	}
}

/// A generic HTTP risk classifier: POSTs the movement to `endpoint` with an
/// optional bearer token, expects a JSON body with a numeric `risk_score`,
/// and excludes anything at or above `risk_threshold`. Grounded on
/// `EllipticClient::single_analysis` (`api/bin/chainflip-btc-deposit-monitor/
/// src/elliptic.rs`), generalised away from Elliptic's HMAC request signing
/// since this engine has no single fixed classifier vendor.
pub struct HttpScamClassifier {
	client: reqwest::Client,
	endpoint: String,
	api_key: Option<String>,
	risk_threshold: f64,
}

impl HttpScamClassifier {
	pub fn new(endpoint: impl Into<String>, api_key: Option<String>, risk_threshold: f64) -> Self {
		Self { client: reqwest::Client::new(), endpoint: endpoint.into(), api_key, risk_threshold }
	}
}

#[async_trait]
impl DustScamClassifier for HttpScamClassifier {
	fn name(&self) -> &str {
		"http-risk-classifier"
	}

	async fn classify(&self, movement: &AssetMovement) -> Verdict {
		let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
			"asset": movement.asset.as_str(),
			"amount": movement.gross_amount.to_string(),
		}));
		if let Some(token) = &self.api_key {
			request = request.bearer_auth(token);
		}

		let response = match request.send().await {
			Ok(response) => response,
			Err(error) => {
				tracing::warn!(%error, "scam classifier request failed, defaulting to clean");
				return Verdict::Clean;
			}
		};

		let body: serde_json::Value = match response.json().await {
			Ok(body) => body,
			Err(error) => {
				tracing::warn!(%error, "scam classifier response was not valid JSON, defaulting to clean");
				return Verdict::Clean;
			}
		};

		match body.get("risk_score").and_then(|v| v.as_f64()) {
			Some(score) if score >= self.risk_threshold => {
				Verdict::Excluded(ExcludeReason::Scam { classifier_name: self.name().to_string() })
			}
			_ => Verdict::Clean,
		}
	}
}

/// Memoising decimals/symbol lookup in front of the durable
/// `token_metadata` table (spec §2 C10), following the same "check cache,
/// fetch on miss, populate cache" shape as `ResponseCache::get_or_fetch` in
/// `ledgerflow-providers`, but backed by the durable store instead of a TTL.
pub struct TokenMetadataCache {
	store: TokenMetadataStore,
	memo: DashMap<(String, String), TokenMetadata>,
}

impl TokenMetadataCache {
	pub fn new(store: TokenMetadataStore) -> Self {
		Self { store, memo: DashMap::new() }
	}

	pub async fn get_or_fetch<F, Fut>(
		&self,
		blockchain: &str,
		contract_address: &str,
		fetch: F,
	) -> Result<TokenMetadata, StoreError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<TokenMetadata, StoreError>>,
	{
		let key = (blockchain.to_string(), contract_address.to_string());
		if let Some(cached) = self.memo.get(&key) {
			return Ok(cached.clone());
		}
		if let Some(stored) = self.store.get(blockchain, contract_address).await? {
			self.memo.insert(key, stored.clone());
			return Ok(stored);
		}

		let fetched = fetch().await?;
		self.store.put(blockchain, contract_address, &fetched).await?;
		self.memo.insert(key, fetched.clone());
		Ok(fetched)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[tokio::test]
	async fn dust_threshold_excludes_small_inflows() {
		let mut thresholds = HashMap::new();
		thresholds.insert(Currency::new("BTC"), dec!(0.0001));
		let classifier = DustThresholdClassifier { thresholds };

		let dust = AssetMovement::new("BTC", dec!(0.00000546), dec!(0.00000546));
		assert_eq!(classifier.classify(&dust).await, Verdict::Excluded(ExcludeReason::Dust));

		let real = AssetMovement::new("BTC", dec!(0.5), dec!(0.5));
		assert_eq!(classifier.classify(&real).await, Verdict::Clean);
	}

	#[tokio::test]
	async fn unthresholded_asset_is_always_clean() {
		let classifier = DustThresholdClassifier { thresholds: HashMap::new() };
		let movement = AssetMovement::new("ETH", dec!(0.0000001), dec!(0.0000001));
		assert_eq!(classifier.classify(&movement).await, Verdict::Clean);
	}
}
