use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::SourceType;

/// Differentiates multiple logical feeds within one provider (e.g. a chain
/// that reports "normal" transfers, token transfers and internal transfers
/// as distinct streams that must be zipped before chunking — spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
	Normal,
	Token,
	Internal,
	Ledger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedState {
	Pending,
	Processed,
}

/// An append-once row produced by a provider. Once written, `provider_data`
/// and `normalized_data` are immutable — later corrections create a new row
/// rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
	pub id: Uuid,
	pub account_id: Uuid,
	pub provider_name: String,
	pub source_type: SourceType,
	/// Stable, provider-supplied key used to correlate this row with others
	/// from the same economic event (refid, order id, tx hash, ...).
	pub event_id: String,
	/// The provider's own identifier for this specific record.
	pub external_id: String,
	pub provider_data: serde_json::Value,
	/// `None` until the row passes schema validation (blockchain sources
	/// must have this populated before processing; exchange sources may
	/// fall back to `provider_data` — spec §4.7 step 1).
	pub normalized_data: Option<serde_json::Value>,
	pub stream_type: StreamType,
	pub created_at: DateTime<Utc>,
	pub processed: ProcessedState,
}

impl RawRecord {
	/// The validated payload to interpret: `normalized_data` if present,
	/// otherwise `provider_data` — but only when the source type permits the
	/// fallback (spec §4.7 step 1: "no silent fallbacks for blockchain
	/// data").
	pub fn interpretable_payload(&self) -> Option<&serde_json::Value> {
		match &self.normalized_data {
			Some(v) => Some(v),
			None if self.source_type == SourceType::ExchangeApi
				|| self.source_type == SourceType::ExchangeCsv =>
				if self.provider_data.is_null() {
					None
				} else {
					Some(&self.provider_data)
				},
			None => None,
		}
	}
}
