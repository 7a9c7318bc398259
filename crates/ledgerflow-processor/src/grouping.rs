use ledgerflow_types::RawRecord;

/// Correlates raw rows belonging to the same economic event (spec §4.7 step
/// 2). `ByCorrelationId`/`ByHash`/`ByOrderId` read the named field out of
/// the row's interpretable payload; `Identity` treats every row as its own
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingStrategy {
	ByCorrelationId,
	ByHash,
	ByOrderId,
	Identity,
}

impl GroupingStrategy {
	pub fn key_for(&self, row: &RawRecord) -> String {
		let field = match self {
			GroupingStrategy::ByCorrelationId => "correlationId",
			GroupingStrategy::ByHash => "hash",
			GroupingStrategy::ByOrderId => "orderId",
			GroupingStrategy::Identity => return row.id.to_string(),
		};
		row.interpretable_payload()
			.and_then(|v| v.get(field))
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or_else(|| row.id.to_string())
	}

	/// Groups `rows` by key, preserving first-seen order (row id order,
	/// since rows arrive sorted by `created_at` — spec §4.7 invariant 5:
	/// "rows sharing a correlation key are always processed in the same
	/// chunk").
	pub fn group<'a>(&self, rows: &'a [RawRecord]) -> Vec<(String, Vec<&'a RawRecord>)> {
		let mut order: Vec<String> = Vec::new();
		let mut groups: std::collections::HashMap<String, Vec<&'a RawRecord>> = std::collections::HashMap::new();
		for row in rows {
			let key = self.key_for(row);
			groups.entry(key.clone()).or_insert_with(|| {
				order.push(key.clone());
				Vec::new()
			});
			groups.get_mut(&key).unwrap().push(row);
		}
		order.into_iter().map(|key| { let rows = groups.remove(&key).unwrap(); (key, rows) }).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::{ProcessedState, SourceType, StreamType};
	use uuid::Uuid;

	fn row(id_byte: u8, correlation: &str) -> RawRecord {
		RawRecord {
			id: Uuid::from_bytes([id_byte; 16]),
			account_id: Uuid::nil(),
			provider_name: "kraken".into(),
			source_type: SourceType::ExchangeApi,
			event_id: format!("evt-{id_byte}"),
			external_id: format!("ext-{id_byte}"),
			provider_data: serde_json::Value::Null,
			normalized_data: Some(serde_json::json!({"correlationId": correlation, "amount": "1", "asset": "BTC"})),
			stream_type: StreamType::Normal,
			created_at: chrono::Utc::now(),
			processed: ProcessedState::Pending,
		}
	}

	#[test]
	fn groups_rows_sharing_a_correlation_key() {
		let rows = vec![row(1, "R1"), row(2, "R2"), row(3, "R1")];
		let groups = GroupingStrategy::ByCorrelationId.group(&rows);
		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].0, "R1");
		assert_eq!(groups[0].1.len(), 2);
		assert_eq!(groups[1].0, "R2");
	}

	#[test]
	fn identity_never_merges_rows() {
		let rows = vec![row(1, "R1"), row(2, "R1")];
		let groups = GroupingStrategy::Identity.group(&rows);
		assert_eq!(groups.len(), 2);
	}
}
