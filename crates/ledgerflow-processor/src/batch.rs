use ledgerflow_types::RawRecord;

use crate::grouping::GroupingStrategy;

/// Splits an account's pending rows into processing chunks (spec §4.7).
/// Implementations never split rows that share a correlation key across two
/// chunks — the hash-boundary extension below exists specifically to
/// preserve that invariant.
pub trait BatchProvider: Send + Sync {
	fn chunks(&self, rows: Vec<RawRecord>) -> Vec<Vec<RawRecord>>;
}

/// A single batch for the whole account — appropriate for exchanges, whose
/// volume is small enough that correlation-boundary chunking isn't needed.
pub struct AllAtOnce;

impl BatchProvider for AllAtOnce {
	fn chunks(&self, rows: Vec<RawRecord>) -> Vec<Vec<RawRecord>> {
		if rows.is_empty() {
			Vec::new()
		} else {
			vec![rows]
		}
	}
}

/// Chunks bounded by `chunk_size` **and** by the natural boundary of
/// `correlation` — a chunk is only cut once the next row's correlation key
/// differs from the last row admitted, so rows that share a key always land
/// in the same chunk (spec §4.7, §8 invariant 5).
pub struct HashGrouped {
	pub chunk_size: usize,
	pub correlation: GroupingStrategy,
}

impl BatchProvider for HashGrouped {
	fn chunks(&self, rows: Vec<RawRecord>) -> Vec<Vec<RawRecord>> {
		let mut chunks = Vec::new();
		let mut current: Vec<RawRecord> = Vec::new();
		let mut iter = rows.into_iter().peekable();

		while let Some(row) = iter.next() {
			let boundary_key = self.correlation.key_for(&row);
			current.push(row);

			if current.len() >= self.chunk_size {
				while let Some(next) = iter.peek() {
					if self.correlation.key_for(next) == boundary_key {
						current.push(iter.next().expect("peeked"));
					} else {
						break;
					}
				}
				chunks.push(std::mem::take(&mut current));
			}
		}
		if !current.is_empty() {
			chunks.push(current);
		}
		chunks
	}
}

/// For chains that report separate "normal"/"token"/"internal" streams:
/// zips all streams into one sequence ordered by `(hash, blockHeight,
/// index)` before applying the same hash-boundary chunking as
/// `HashGrouped` (spec §4.7).
pub struct MultiStreamZipped {
	pub chunk_size: usize,
}

impl BatchProvider for MultiStreamZipped {
	fn chunks(&self, mut rows: Vec<RawRecord>) -> Vec<Vec<RawRecord>> {
		rows.sort_by(|a, b| composite_key(a).cmp(&composite_key(b)));
		HashGrouped { chunk_size: self.chunk_size, correlation: GroupingStrategy::ByHash }.chunks(rows)
	}
}

fn composite_key(row: &RawRecord) -> (String, i64, i64) {
	let payload = row.interpretable_payload();
	let field_str = |name: &str| payload.and_then(|v| v.get(name)).and_then(|v| v.as_str()).unwrap_or_default().to_string();
	let field_i64 = |name: &str| payload.and_then(|v| v.get(name)).and_then(|v| v.as_i64()).unwrap_or(0);
	(field_str("hash"), field_i64("blockHeight"), field_i64("index"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ledgerflow_types::{ProcessedState, SourceType, StreamType};
	use uuid::Uuid;

	fn row(id_byte: u8, hash: &str) -> RawRecord {
		RawRecord {
			id: Uuid::from_bytes([id_byte; 16]),
			account_id: Uuid::nil(),
			provider_name: "bitcoin-explorer".into(),
			source_type: SourceType::Blockchain,
			event_id: format!("evt-{id_byte}"),
			external_id: format!("ext-{id_byte}"),
			provider_data: serde_json::Value::Null,
			normalized_data: Some(serde_json::json!({"hash": hash, "amount": "1", "asset": "BTC"})),
			stream_type: StreamType::Normal,
			created_at: chrono::Utc::now(),
			processed: ProcessedState::Pending,
		}
	}

	#[test]
	fn never_splits_a_correlated_boundary() {
		let rows = vec![row(1, "H1"), row(2, "H1"), row(3, "H1"), row(4, "H2")];
		let provider = HashGrouped { chunk_size: 2, correlation: GroupingStrategy::ByHash };
		let chunks = provider.chunks(rows);
		assert_eq!(chunks[0].len(), 3, "all three H1 rows must stay together despite chunk_size=2");
		assert_eq!(chunks[1].len(), 1);
	}

	#[test]
	fn all_at_once_never_splits() {
		let rows = vec![row(1, "H1"), row(2, "H2")];
		assert_eq!(AllAtOnce.chunks(rows).len(), 1);
	}
}
