use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
	Blockchain,
	ExchangeApi,
	ExchangeCsv,
}

/// A user's connection to one source: an on-chain address, an extended
/// public key, or an exchange account. Uniqueness is `(user_id, source_name,
/// identifier)`; `parent_account_id` links a derived child address back to
/// the extended-key account it was discovered from (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
	pub id: Uuid,
	pub user_id: Uuid,
	pub source_name: String,
	pub source_type: SourceType,
	pub identifier: String,
	pub provider_name: Option<String>,
	pub parent_account_id: Option<Uuid>,
}

impl Account {
	pub fn is_derived_child(&self) -> bool {
		self.parent_account_id.is_some()
	}
}
