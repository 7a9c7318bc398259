use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of pagination token a cursor's `value` represents.
///
/// `PageToken` is provider-scoped (it only means something to the provider
/// that minted it); the other variants are "universal" cursors, extracted
/// from the last record seen, and are transferable across providers that
/// declare support for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorType {
	PageToken,
	BlockNumber,
	Timestamp,
	TxHash,
}

impl CursorType {
	pub fn is_transferable(&self) -> bool {
		!matches!(self, CursorType::PageToken)
	}
}

/// A single positional marker: a type tag plus its opaque value.
///
/// `value` is stored as a string so that the same struct covers block
/// heights, RFC3339 timestamps, hashes and opaque page tokens without a
/// generic parameter leaking into every caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
	#[serde(rename = "type")]
	pub cursor_type: CursorType,
	pub value: String,
	/// Required when `cursor_type == PageToken`; the provider that minted
	/// this token. Never set for universal cursor types.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider_name: Option<String>,
}

impl CursorPosition {
	pub fn page_token(provider_name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			cursor_type: CursorType::PageToken,
			value: value.into(),
			provider_name: Some(provider_name.into()),
		}
	}

	pub fn universal(cursor_type: CursorType, value: impl Into<String>) -> Self {
		debug_assert!(cursor_type.is_transferable());
		Self { cursor_type, value: value.into(), provider_name: None }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorMeta {
	pub provider_name: String,
	pub updated_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub is_complete: Option<bool>,
}

/// Opaque, resumable paging state for one `(accountId, streamType)` pair.
///
/// `primary` is the provider's preferred pagination token; `alternatives`
/// are universal cursors extracted from the last record, kept around so a
/// different provider can resume the stream (see §4.3/§4.4 of the spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
	pub primary: CursorPosition,
	pub alternatives: Vec<CursorPosition>,
	pub last_record_id: Option<String>,
	pub total_fetched: u64,
	pub meta: CursorMeta,
}

impl Cursor {
	pub fn new(primary: CursorPosition, meta: CursorMeta) -> Self {
		Self { primary, alternatives: Vec::new(), last_record_id: None, total_fetched: 0, meta }
	}

	/// A provider can resume from this cursor if its `primary.type` (or any
	/// alternative) is one of `supported_cursor_types`, with the extra rule
	/// that a `pageToken` cursor is only usable by the provider that minted
	/// it.
	pub fn resumable_by(&self, provider_name: &str, supported_cursor_types: &[CursorType]) -> bool {
		let candidates = std::iter::once(&self.primary).chain(self.alternatives.iter());
		candidates.any(|pos| {
			if pos.cursor_type == CursorType::PageToken {
				pos.provider_name.as_deref() == Some(provider_name)
					&& supported_cursor_types.contains(&CursorType::PageToken)
			} else {
				supported_cursor_types.contains(&pos.cursor_type)
			}
		})
	}

	/// The best transferable (non-page-token) position available, used when
	/// handing a stream off to a different provider.
	pub fn best_transferable(&self) -> Option<&CursorPosition> {
		if self.primary.cursor_type.is_transferable() {
			return Some(&self.primary);
		}
		self.alternatives.iter().find(|p| p.cursor_type.is_transferable())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn meta() -> CursorMeta {
		CursorMeta { provider_name: "alpha".into(), updated_at: Utc::now(), is_complete: None }
	}

	#[test]
	fn page_token_only_resumable_by_minting_provider() {
		let cursor = Cursor::new(CursorPosition::page_token("alpha", "tok-1"), meta());
		assert!(cursor.resumable_by("alpha", &[CursorType::PageToken]));
		assert!(!cursor.resumable_by("beta", &[CursorType::PageToken]));
	}

	#[test]
	fn universal_cursor_resumable_by_any_capable_provider() {
		let cursor = Cursor::new(CursorPosition::universal(CursorType::BlockNumber, "100"), meta());
		assert!(cursor.resumable_by("beta", &[CursorType::BlockNumber]));
		assert!(!cursor.resumable_by("beta", &[CursorType::Timestamp]));
	}

	#[test]
	fn best_transferable_falls_back_to_alternatives() {
		let mut cursor = Cursor::new(CursorPosition::page_token("alpha", "tok-1"), meta());
		cursor.alternatives.push(CursorPosition::universal(CursorType::BlockNumber, "42"));
		assert_eq!(cursor.best_transferable().unwrap().value, "42");
	}
}
