use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledgerflow_types::{Cursor, ImportSession, SessionStatus, StoreError, StreamType};
use sqlx::error::DatabaseError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Import-session lifecycle persistence (spec §3 ImportSession, §4.6). At
/// most one `started` session per account is enforced by a partial unique
/// index (`import_sessions_one_started_per_account`), not by an
/// application-level lock.
#[derive(Clone)]
pub struct SessionStore {
	pool: PgPool,
}

impl SessionStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Starts a new session, failing with `StoreError::Conflict` if the
	/// account already has one in progress.
	pub async fn start(&self, account_id: Uuid) -> Result<ImportSession, StoreError> {
		let session = ImportSession::started(account_id);
		let cursors = serde_json::to_value(&session.cursors_by_stream).map_err(|e| StoreError::Db(e.to_string()))?;

		let result = sqlx::query(
			"INSERT INTO import_sessions (id, account_id, started_at, status, cursors_by_stream, imported, skipped, result_metadata) \
			 VALUES ($1, $2, $3, 'started', $4, 0, 0, 'null')",
		)
		.bind(session.id)
		.bind(session.account_id)
		.bind(session.started_at)
		.bind(cursors)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(session),
			Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(StoreError::Conflict {
				table: "import_sessions".to_string(),
				detail: format!("account {account_id} already has a started session"),
			}),
			Err(e) => Err(StoreError::Db(e.to_string())),
		}
	}

	/// Persists the cursor for one stream plus the running import/skip
	/// counters. Callers call this once per committed batch, in the same DB
	/// transaction as the batch's raw-row insert (spec §4.6).
	pub async fn update_cursor(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		session_id: Uuid,
		stream_type: &StreamType,
		cursor: &Cursor,
		imported_delta: u64,
		skipped_delta: u64,
	) -> Result<(), StoreError> {
		let mut session = self.get_locked(tx, session_id).await?;
		session.cursors_by_stream.insert(stream_type.clone(), cursor.clone());
		session.imported += imported_delta;
		session.skipped += skipped_delta;

		let cursors = serde_json::to_value(&session.cursors_by_stream).map_err(|e| StoreError::Db(e.to_string()))?;
		sqlx::query("UPDATE import_sessions SET cursors_by_stream = $1, imported = $2, skipped = $3 WHERE id = $4")
			.bind(cursors)
			.bind(session.imported as i64)
			.bind(session.skipped as i64)
			.bind(session_id)
			.execute(&mut **tx)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	/// Transitions `started → completed`. Refuses unless every stream has
	/// reported `isComplete=true` (spec §3).
	pub async fn complete(&self, session_id: Uuid) -> Result<(), StoreError> {
		let session = self.get(session_id).await?;
		if !session.all_streams_complete() {
			return Err(StoreError::Db(format!(
				"refusing to complete session {session_id}: not every stream has reported isComplete=true"
			)));
		}
		sqlx::query("UPDATE import_sessions SET status = 'completed', completed_at = now() WHERE id = $1 AND status = 'started'")
			.bind(session_id)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	/// Transitions to `failed`, e.g. on cancellation or exhausted providers
	/// (spec §5, §7).
	pub async fn fail(&self, session_id: Uuid) -> Result<(), StoreError> {
		sqlx::query("UPDATE import_sessions SET status = 'failed', completed_at = now() WHERE id = $1")
			.bind(session_id)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(())
	}

	pub async fn get(&self, session_id: Uuid) -> Result<ImportSession, StoreError> {
		let row = sqlx::query(
			"SELECT id, account_id, started_at, completed_at, status, cursors_by_stream, imported, skipped, result_metadata \
			 FROM import_sessions WHERE id = $1",
		)
		.bind(session_id)
		.fetch_one(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		row_to_session(row)
	}

	async fn get_locked(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		session_id: Uuid,
	) -> Result<ImportSession, StoreError> {
		let row = sqlx::query(
			"SELECT id, account_id, started_at, completed_at, status, cursors_by_stream, imported, skipped, result_metadata \
			 FROM import_sessions WHERE id = $1 FOR UPDATE",
		)
		.bind(session_id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;
		row_to_session(row)
	}

	/// Whether `account_id` currently has a non-completed session, which
	/// blocks the processor from running (spec §4.6, §7 Integrity errors).
	pub async fn has_blocking_session(&self, account_id: Uuid) -> Result<bool, StoreError> {
		let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM import_sessions WHERE account_id = $1 AND status != 'completed') AS blocking")
			.bind(account_id)
			.fetch_one(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		row.try_get("blocking").map_err(|e| StoreError::Db(e.to_string()))
	}
}

fn row_to_session(row: PgRow) -> Result<ImportSession, StoreError> {
	let status: String = row.try_get("status").map_err(|e| StoreError::Db(e.to_string()))?;
	let status = match status.as_str() {
		"started" => SessionStatus::Started,
		"completed" => SessionStatus::Completed,
		"failed" => SessionStatus::Failed,
		other => return Err(StoreError::Db(format!("unrecognised session status '{other}' in storage"))),
	};
	let cursors_json: serde_json::Value = row.try_get("cursors_by_stream").map_err(|e| StoreError::Db(e.to_string()))?;
	let cursors_by_stream: HashMap<StreamType, Cursor> =
		serde_json::from_value(cursors_json).map_err(|e| StoreError::Db(e.to_string()))?;
	let imported: i64 = row.try_get("imported").map_err(|e| StoreError::Db(e.to_string()))?;
	let skipped: i64 = row.try_get("skipped").map_err(|e| StoreError::Db(e.to_string()))?;
	let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(|e| StoreError::Db(e.to_string()))?;

	Ok(ImportSession {
		id: row.try_get("id").map_err(|e| StoreError::Db(e.to_string()))?,
		account_id: row.try_get("account_id").map_err(|e| StoreError::Db(e.to_string()))?,
		started_at: row.try_get("started_at").map_err(|e| StoreError::Db(e.to_string()))?,
		completed_at,
		status,
		cursors_by_stream,
		imported: imported as u64,
		skipped: skipped as u64,
		result_metadata: row.try_get("result_metadata").map_err(|e| StoreError::Db(e.to_string()))?,
	})
}
