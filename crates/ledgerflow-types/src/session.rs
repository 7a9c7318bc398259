use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cursor::Cursor;
use crate::raw_record::StreamType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Started,
	Completed,
	Failed,
}

/// The lifecycle record for one run of an account's import. Only one
/// session per account may be `Started` at a time (enforced at the store
/// layer — see `ledgerflow-store`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
	pub id: Uuid,
	pub account_id: Uuid,
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	pub status: SessionStatus,
	pub cursors_by_stream: HashMap<StreamType, Cursor>,
	pub imported: u64,
	pub skipped: u64,
	pub result_metadata: serde_json::Value,
}

impl ImportSession {
	pub fn started(account_id: Uuid) -> Self {
		Self {
			id: Uuid::new_v4(),
			account_id,
			started_at: Utc::now(),
			completed_at: None,
			status: SessionStatus::Started,
			cursors_by_stream: HashMap::new(),
			imported: 0,
			skipped: 0,
			result_metadata: serde_json::Value::Null,
		}
	}

	/// All streams must report `isComplete=true` before a session may
	/// transition to `completed` (spec §3 ImportSession invariant).
	pub fn all_streams_complete(&self) -> bool {
		!self.cursors_by_stream.is_empty()
			&& self.cursors_by_stream.values().all(|c| c.meta.is_complete == Some(true))
	}
}
