use std::collections::HashMap;
use std::sync::Arc;

use ledgerflow_providers::{
	Capabilities, ClientDefaults, GenericHttpClient, Operation, ProviderMetadata, ProviderRegistry,
	RateLimitConfig, ReplayWindow,
};
use ledgerflow_types::CursorType;

use crate::settings::ProviderSettings;

/// Builds the registry the failover engine dispatches through from the
/// config file's `[[providers]]` entries (spec §4.1). Every entry here gets
/// a `GenericHttpClient`; a provider with a genuinely bespoke wire format
/// is registered directly in code instead (see `generic_http.rs`'s doc
/// comment), which is why this function is allowed to return an empty
/// registry — `import`/`process` against an unconfigured source fail with
/// `ProviderError::NoCompatibleProvider` rather than panicking.
pub fn build_registry(entries: &[ProviderSettings]) -> anyhow::Result<ProviderRegistry> {
	let mut registry = ProviderRegistry::new();

	for entry in entries {
		let mut one_shot_paths = HashMap::new();
		let mut supported_operations = Vec::new();

		for (op_name, path) in &entry.one_shot_paths {
			let op = parse_operation(op_name)?;
			supported_operations.push(op);
			one_shot_paths.insert(op, path.clone());
		}

		let stream_path = entry.stream_path.clone();
		if let Some(stream_op_name) = &entry.stream_operation {
			let stream_op = parse_operation(stream_op_name)?;
			supported_operations.push(stream_op);
		}

		let capabilities = Capabilities {
			supported_operations,
			supported_cursor_types: vec![CursorType::PageToken, CursorType::BlockNumber, CursorType::Timestamp],
			preferred_cursor_type: CursorType::PageToken,
			replay_window: ReplayWindow { blocks: entry.replay_window_blocks, minutes: None, records: None },
		};

		let client = Arc::new(GenericHttpClient::new(
			entry.name.clone(),
			entry.base_url.clone(),
			capabilities.clone(),
			std::time::Duration::from_secs(10),
			entry.api_key_env_var.clone(),
			one_shot_paths,
			stream_path,
		));

		let metadata = ProviderMetadata {
			name: entry.name.clone(),
			blockchain_or_exchange: entry.blockchain_or_exchange.clone(),
			base_url: entry.base_url.clone(),
			requires_api_key: entry.requires_api_key,
			api_key_env_var: entry.api_key_env_var.clone(),
			capabilities,
			defaults: ClientDefaults { rate_limit: RateLimitConfig::default(), retries: 3, timeout: std::time::Duration::from_secs(10) },
			priority: entry.priority,
		};

		registry.register(metadata, client);
	}

	Ok(registry)
}

fn parse_operation(name: &str) -> anyhow::Result<Operation> {
	serde_json::from_value(serde_json::Value::String(name.to_string()))
		.map_err(|_| anyhow::anyhow!("unrecognised operation name '{name}' in provider config"))
}
