use std::collections::HashMap;
use std::sync::Arc;

use ledgerflow_types::{ProviderError, SourceType};

use crate::capability::{Operation, ProviderMetadata};
use crate::client::ProviderClient;

struct Entry {
	metadata: ProviderMetadata,
	client: Arc<dyn ProviderClient>,
}

/// Declarative registry of providers, keyed by name (spec §4.1, §9:
/// "Dispatch via a registry keyed by `name`").
#[derive(Default)]
pub struct ProviderRegistry {
	entries: HashMap<String, Entry>,
}

impl ProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, metadata: ProviderMetadata, client: Arc<dyn ProviderClient>) {
		self.entries.insert(metadata.name.clone(), Entry { metadata, client });
	}

	pub fn get(&self, name: &str) -> Option<(&ProviderMetadata, &Arc<dyn ProviderClient>)> {
		self.entries.get(name).map(|e| (&e.metadata, &e.client))
	}

	/// Candidate providers for `blockchain_or_exchange` that support `op`,
	/// ordered by declared priority (highest first). The failover engine
	/// re-ranks these with live health/circuit scores.
	pub fn candidates_for(
		&self,
		blockchain_or_exchange: &str,
		op: Operation,
	) -> Vec<(&ProviderMetadata, &Arc<dyn ProviderClient>)> {
		let mut candidates: Vec<_> = self
			.entries
			.values()
			.filter(|e| {
				e.metadata.blockchain_or_exchange == blockchain_or_exchange
					&& e.metadata.capabilities.supports(op)
			})
			.map(|e| (&e.metadata, &e.client))
			.collect();
		candidates.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));
		candidates
	}

	/// Every registered provider's metadata, for startup bookkeeping such as
	/// seeding circuit breaker state from durable storage.
	pub fn all(&self) -> impl Iterator<Item = &ProviderMetadata> {
		self.entries.values().map(|e| &e.metadata)
	}
}

/// Resolves a source name to a `SourceType` by explicit registration rather
/// than by constructing a dummy client and classifying it from which
/// exceptions it throws (spec §9 open question: "a registry-based
/// resolution is preferred").
#[derive(Default)]
pub struct SourceRegistry {
	kinds: HashMap<String, SourceType>,
}

impl SourceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn declare(&mut self, source_name: impl Into<String>, kind: SourceType) {
		self.kinds.insert(source_name.into(), kind);
	}

	pub fn lookup(&self, source_name: &str) -> Result<SourceType, ProviderError> {
		self.kinds
			.get(source_name)
			.copied()
			.ok_or_else(|| ProviderError::UnknownSource(source_name.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_source_is_a_typed_error_not_a_probe() {
		let registry = SourceRegistry::new();
		let err = registry.lookup("mystery-chain").unwrap_err();
		assert!(matches!(err, ProviderError::UnknownSource(name) if name == "mystery-chain"));
	}

	#[test]
	fn declared_source_resolves() {
		let mut registry = SourceRegistry::new();
		registry.declare("bitcoin", SourceType::Blockchain);
		assert_eq!(registry.lookup("bitcoin").unwrap(), SourceType::Blockchain);
	}
}
