use std::collections::HashMap;

use ledgerflow_processor::{AllAtOnce, BatchProvider, GrossAmountsStrategy, GroupingStrategy, InterpretationStrategy, StandardAmounts};

/// Per-source processing configuration: which batching/grouping/
/// interpretation strategy trio applies to an account's pending rows (spec
/// §4.7, §9: "Dynamic dispatch of interpretation strategies ... selected at
/// registration time"). Kept separate from `SourceRegistry` (C1's
/// blockchain-vs-exchange classification) since this answers a narrower
/// question: how a given source's rows are batched and interpreted once
/// fetched.
pub struct ProcessingProfile {
	pub grouping: GroupingStrategy,
	pub batching: Box<dyn BatchProvider>,
	pub strategy: Box<dyn InterpretationStrategy>,
}

/// Registry of `ProcessingProfile`s keyed by source name, mirroring
/// `ProviderRegistry`'s "declare once, look up by name" shape.
#[derive(Default)]
pub struct ProcessingProfileRegistry {
	profiles: HashMap<String, ProcessingProfile>,
}

impl ProcessingProfileRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn declare(&mut self, source_name: impl Into<String>, profile: ProcessingProfile) {
		self.profiles.insert(source_name.into(), profile);
	}

	pub fn get(&self, source_name: &str) -> Option<&ProcessingProfile> {
		self.profiles.get(source_name)
	}

	/// A registry pre-populated with the profiles exercised by spec §8's
	/// literal scenarios: Kraken's ledger-row correlation (S1), Coinbase's
	/// gross-amount withdrawals (S2), and a generic on-chain hash-grouped
	/// stream (S3). Callers extend this with `declare` for any other source.
	pub fn with_defaults() -> Self {
		let mut registry = Self::new();
		registry.declare(
			"kraken",
			ProcessingProfile {
				grouping: GroupingStrategy::ByCorrelationId,
				batching: Box::new(AllAtOnce),
				strategy: Box::new(StandardAmounts),
			},
		);
		registry.declare(
			"coinbase",
			ProcessingProfile {
				grouping: GroupingStrategy::ByOrderId,
				batching: Box::new(AllAtOnce),
				strategy: Box::new(GrossAmountsStrategy::coinbase()),
			},
		);
		registry.declare(
			"bitcoin",
			ProcessingProfile {
				grouping: GroupingStrategy::ByHash,
				batching: Box::new(ledgerflow_processor::HashGrouped { chunk_size: 500, correlation: GroupingStrategy::ByHash }),
				strategy: Box::new(GrossAmountsStrategy::native_on_chain()),
			},
		);
		registry
	}
}
