use ledgerflow_types::{Account, SourceType, StoreError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::codec::{source_type_from_text, source_type_to_text};

/// Users and accounts (spec §3 `Account`, §6 `users`/`accounts`). The engine
/// has no sign-up flow; `ensure_default_user` gives the single-tenant
/// orchestrator (C5) a stable `user_id` to attach accounts to.
#[derive(Clone)]
pub struct AccountStore {
	pool: PgPool,
}

impl AccountStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Returns the sole user row, creating it on first use. This engine has
	/// no multi-tenant auth (spec §1 Non-goals); every account belongs to
	/// this one user.
	pub async fn ensure_default_user(&self) -> Result<Uuid, StoreError> {
		if let Some(id) = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users LIMIT 1")
			.fetch_optional(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?
		{
			return Ok(id);
		}

		let id = Uuid::new_v4();
		sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT DO NOTHING")
			.bind(id)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::Db(e.to_string()))?;
		Ok(id)
	}

	/// Finds the account for `(user_id, source_name, identifier)` or creates
	/// it, honouring the unique constraint rather than racing a check with
	/// an insert (spec §3 Account uniqueness).
	pub async fn find_or_create(
		&self,
		user_id: Uuid,
		source_name: &str,
		source_type: SourceType,
		identifier: &str,
		provider_name: Option<&str>,
		parent_account_id: Option<Uuid>,
	) -> Result<Account, StoreError> {
		if let Some(existing) = self.find(user_id, source_name, identifier).await? {
			return Ok(existing);
		}

		let account = Account {
			id: Uuid::new_v4(),
			user_id,
			source_name: source_name.to_string(),
			source_type,
			identifier: identifier.to_string(),
			provider_name: provider_name.map(str::to_string),
			parent_account_id,
		};

		let result = sqlx::query(
			"INSERT INTO accounts (id, user_id, source_name, source_type, identifier, provider_name, parent_account_id) \
			 VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (user_id, source_name, identifier) DO NOTHING",
		)
		.bind(account.id)
		.bind(account.user_id)
		.bind(&account.source_name)
		.bind(source_type_to_text(account.source_type))
		.bind(&account.identifier)
		.bind(&account.provider_name)
		.bind(account.parent_account_id)
		.execute(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		if result.rows_affected() == 1 {
			Ok(account)
		} else {
			self.find(user_id, source_name, identifier)
				.await?
				.ok_or_else(|| StoreError::Db("account insert raced but no row found on reread".to_string()))
		}
	}

	pub async fn find(&self, user_id: Uuid, source_name: &str, identifier: &str) -> Result<Option<Account>, StoreError> {
		let row = sqlx::query(
			"SELECT id, user_id, source_name, source_type, identifier, provider_name, parent_account_id \
			 FROM accounts WHERE user_id = $1 AND source_name = $2 AND identifier = $3",
		)
		.bind(user_id)
		.bind(source_name)
		.bind(identifier)
		.fetch_optional(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		row.map(row_to_account).transpose()
	}

	pub async fn get(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
		let row = sqlx::query(
			"SELECT id, user_id, source_name, source_type, identifier, provider_name, parent_account_id \
			 FROM accounts WHERE id = $1",
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		row.map(row_to_account).transpose()
	}

	/// Every account belonging to `user_id`, used by `process`/`reprocess`
	/// when invoked with no explicit account id (spec §6 command surface).
	pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<Account>, StoreError> {
		let rows = sqlx::query(
			"SELECT id, user_id, source_name, source_type, identifier, provider_name, parent_account_id \
			 FROM accounts WHERE user_id = $1 ORDER BY source_name, identifier",
		)
		.bind(user_id)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		rows.into_iter().map(row_to_account).collect()
	}

	pub async fn children_of(&self, parent_account_id: Uuid) -> Result<Vec<Account>, StoreError> {
		let rows = sqlx::query(
			"SELECT id, user_id, source_name, source_type, identifier, provider_name, parent_account_id \
			 FROM accounts WHERE parent_account_id = $1",
		)
		.bind(parent_account_id)
		.fetch_all(&self.pool)
		.await
		.map_err(|e| StoreError::Db(e.to_string()))?;

		rows.into_iter().map(row_to_account).collect()
	}
}

fn row_to_account(row: PgRow) -> Result<Account, StoreError> {
	let source_type: String = row.try_get("source_type").map_err(|e| StoreError::Db(e.to_string()))?;
	Ok(Account {
		id: row.try_get("id").map_err(|e| StoreError::Db(e.to_string()))?,
		user_id: row.try_get("user_id").map_err(|e| StoreError::Db(e.to_string()))?,
		source_name: row.try_get("source_name").map_err(|e| StoreError::Db(e.to_string()))?,
		source_type: source_type_from_text(&source_type)?,
		identifier: row.try_get("identifier").map_err(|e| StoreError::Db(e.to_string()))?,
		provider_name: row.try_get("provider_name").map_err(|e| StoreError::Db(e.to_string()))?,
		parent_account_id: row.try_get("parent_account_id").map_err(|e| StoreError::Db(e.to_string()))?,
	})
}
