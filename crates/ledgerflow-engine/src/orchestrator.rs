use std::str::FromStr;
use std::sync::Arc;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpub};
use bitcoin::secp256k1::Secp256k1;
use chrono::Utc;
use futures::StreamExt;
use ledgerflow_ingest::FailoverEngine;
use ledgerflow_providers::Operation;
use ledgerflow_store::{AccountStore, RawDataStore, SessionStore};
use ledgerflow_types::{Account, Cursor, EngineError, RawRecord, SourceType, StreamType};
use uuid::Uuid;

use crate::eventbus::{Envelope, EventBus};

/// How many consecutive unused derived addresses end a gap-limit scan (spec
/// §4.5, §8 scenario S5). Chosen to match the scenario's literal gap of 20.
const DEFAULT_GAP_LIMIT: u32 = 20;

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
	pub imported: u64,
	pub skipped: u64,
}

/// Manages users/accounts and runs per-account streaming imports (spec §2
/// C5, §4.5). Follows the teacher's `EpochStart`/address-monitor startup
/// sequencing (`btc/witnesser.rs::start`), generalised from one chain's
/// MPC-derived address set to BIP-32 child-address discovery from a single
/// extended public key — no threshold signing is involved here, so
/// `bitcoin::bip32` (already a teacher dependency) replaces chainflip's
/// on-chain key ceremony.
pub struct IngestionOrchestrator {
	accounts: AccountStore,
	sessions: SessionStore,
	raw_data: RawDataStore,
	failover: Arc<FailoverEngine>,
	events: Arc<EventBus>,
}

impl IngestionOrchestrator {
	pub fn new(
		accounts: AccountStore,
		sessions: SessionStore,
		raw_data: RawDataStore,
		failover: Arc<FailoverEngine>,
		events: Arc<EventBus>,
	) -> Self {
		Self { accounts, sessions, raw_data, failover, events }
	}

	/// Imports a regular address or exchange account: one account, one
	/// streaming import (spec §4.5 second paragraph).
	pub async fn import_account(
		&self,
		source_name: &str,
		source_type: SourceType,
		identifier: &str,
		provider_name: Option<&str>,
	) -> Result<ImportOutcome, EngineError> {
		let user_id = self.accounts.ensure_default_user().await?;
		let account = self
			.accounts
			.find_or_create(user_id, source_name, source_type, identifier, provider_name, None)
			.await?;
		self.run_single_account_import(&account).await
	}

	/// Imports an extended public key: derives child addresses via a
	/// gap-limit scan, creates one child account per derived address, then
	/// runs each child's import in series, aggregating results and failing
	/// fast on the first child failure (spec §4.5 first paragraph, §8
	/// scenario S5).
	pub async fn import_extended_key(
		&self,
		source_name: &str,
		xpub: &str,
		gap_limit: Option<u32>,
	) -> Result<ImportOutcome, EngineError> {
		let user_id = self.accounts.ensure_default_user().await?;
		let parent = self
			.accounts
			.find_or_create(user_id, source_name, SourceType::Blockchain, xpub, None, None)
			.await?;

		let addresses = self.scan_active_addresses(source_name, xpub, gap_limit.unwrap_or(DEFAULT_GAP_LIMIT)).await?;

		let mut outcome = ImportOutcome::default();
		for (index, address) in addresses.iter().enumerate() {
			let child = self
				.accounts
				.find_or_create(
					user_id,
					source_name,
					SourceType::Blockchain,
					address,
					None,
					Some(parent.id),
				)
				.await?;
			tracing::info!(parent = %parent.id, child = %child.id, %index, "importing derived child account");
			let child_outcome = self.run_single_account_import(&child).await?;
			outcome.imported += child_outcome.imported;
			outcome.skipped += child_outcome.skipped;
		}
		Ok(outcome)
	}

	/// Gap-limit scan (spec §4.5 step 2, §8 scenario S5): derives receive
	/// addresses at `m/0/i` one at a time, probing each with a one-shot
	/// `hasAddressTransactions` call, and stops once `gap_limit` consecutive
	/// indices come back with no activity. Only indices with activity are
	/// returned, so a scenario with activity at indices 0, 1, 5 under
	/// `gap_limit = 20` yields exactly 3 addresses, not 20.
	async fn scan_active_addresses(&self, source_name: &str, xpub: &str, gap_limit: u32) -> Result<Vec<String>, EngineError> {
		let chain = external_chain(xpub)
			.map_err(|e| EngineError::Other(format!("failed to derive addresses from {source_name} xpub: {e}")))?;

		let mut active = Vec::new();
		let mut consecutive_misses = 0u32;
		let mut index = 0u32;
		while consecutive_misses < gap_limit {
			let address = derive_address(&chain, index)
				.map_err(|e| EngineError::Other(format!("failed to derive address index {index} from {source_name} xpub: {e}")))?;

			let record = self.failover.execute_once(Operation::HasAddressTransactions, source_name, &address, None).await?;
			if has_activity(&record) {
				active.push(address);
				consecutive_misses = 0;
			} else {
				consecutive_misses += 1;
			}
			index += 1;
		}
		Ok(active)
	}

	async fn run_single_account_import(&self, account: &Account) -> Result<ImportOutcome, EngineError> {
		let span = tracing::info_span!("import", account_id = %account.id, source = %account.source_name);
		let _enter = span.enter();

		self.events.publish(Envelope::ImportStarted { account_id: account.id, at: Utc::now() });

		let op = match account.source_type {
			SourceType::Blockchain => Operation::StreamTransactions,
			SourceType::ExchangeApi => Operation::StreamTransactions,
			SourceType::ExchangeCsv => Operation::StreamLedger,
		};

		let session = match self.sessions.start(account.id).await {
			Ok(session) => session,
			Err(error) => {
				self.events.publish(Envelope::ImportFailed {
					account_id: account.id,
					reason: error.to_string(),
					at: Utc::now(),
				});
				return Err(error.into());
			}
		};

		let blockchain_or_exchange = account.provider_name.as_deref().unwrap_or(&account.source_name).to_string();
		let resume_cursor: Option<Cursor> = session.cursors_by_stream.get(&StreamType::Normal).cloned();

		let stream = Arc::clone(&self.failover).stream_batches(
			op,
			blockchain_or_exchange,
			account.identifier.clone(),
			resume_cursor,
			ledgerflow_ingest::DEFAULT_WINDOW,
			account.provider_name.clone(),
		);
		futures::pin_mut!(stream);

		let mut outcome = ImportOutcome::default();
		while let Some(batch) = stream.next().await {
			let batch = match batch {
				Ok(batch) => batch,
				Err(error) => {
					self.sessions.fail(session.id).await?;
					self.events.publish(Envelope::ImportFailed {
						account_id: account.id,
						reason: error.to_string(),
						at: Utc::now(),
					});
					return Err(error.into());
				}
			};

			let rows: Vec<RawRecord> = batch.data.iter().map(|record| typed_record_to_raw(account, record)).collect();

			let mut tx = self.raw_data.begin().await?;
			let insert_outcome = self.raw_data.insert_batch(&mut tx, &rows).await?;
			self.sessions
				.update_cursor(
					&mut tx,
					session.id,
					&StreamType::Normal,
					&batch.cursor,
					insert_outcome.inserted,
					insert_outcome.skipped,
				)
				.await?;
			tx.commit().await.map_err(|e| EngineError::Other(e.to_string()))?;

			outcome.imported += insert_outcome.inserted;
			outcome.skipped += insert_outcome.skipped;
		}

		self.sessions.complete(session.id).await?;
		self.events.publish(Envelope::ImportCompleted {
			account_id: account.id,
			imported: outcome.imported,
			skipped: outcome.skipped,
			at: Utc::now(),
		});
		Ok(outcome)
	}
}

fn typed_record_to_raw(account: &Account, record: &ledgerflow_providers::TypedRecord) -> RawRecord {
	let event_id = record
		.normalized
		.get("eventId")
		.and_then(|v| v.as_str())
		.unwrap_or_else(|| record.normalized.get("id").and_then(|v| v.as_str()).unwrap_or(""))
		.to_string();
	let external_id = record
		.normalized
		.get("externalId")
		.and_then(|v| v.as_str())
		.unwrap_or(&event_id)
		.to_string();

	RawRecord {
		id: Uuid::new_v4(),
		account_id: account.id,
		provider_name: account.provider_name.clone().unwrap_or_else(|| account.source_name.clone()),
		source_type: account.source_type,
		event_id,
		external_id,
		provider_data: record.raw.clone(),
		normalized_data: Some(record.normalized.clone()),
		stream_type: StreamType::Normal,
		created_at: Utc::now(),
		processed: ledgerflow_types::ProcessedState::Pending,
	}
}

/// The external (receive) chain `m/0` of an xpub, from which every candidate
/// address is derived by index.
fn external_chain(xpub: &str) -> Result<Xpub, bitcoin::bip32::Error> {
	let secp = Secp256k1::verification_only();
	let xpub = Xpub::from_str(xpub)?;
	xpub.derive_pub(&secp, &DerivationPath::from(vec![ChildNumber::from_normal_idx(0)?]))
}

/// The receive address at `m/0/index`.
fn derive_address(external_chain: &Xpub, index: u32) -> Result<String, bitcoin::bip32::Error> {
	let secp = Secp256k1::verification_only();
	let child = external_chain.derive_pub(&secp, &DerivationPath::from(vec![ChildNumber::from_normal_idx(index)?]))?;
	let address = bitcoin::Address::p2wpkh(&bitcoin::CompressedPublicKey(child.public_key), bitcoin::Network::Bitcoin);
	Ok(address.to_string())
}

/// Interprets a `hasAddressTransactions` response: either a bare JSON bool,
/// or an object carrying `hasTransactions`/`hasActivity`. Anything else is
/// treated as no activity rather than failing the scan.
fn has_activity(record: &ledgerflow_providers::TypedRecord) -> bool {
	match &record.normalized {
		serde_json::Value::Bool(b) => *b,
		serde_json::Value::Object(obj) => obj
			.get("hasTransactions")
			.or_else(|| obj.get("hasActivity"))
			.and_then(serde_json::Value::as_bool)
			.unwrap_or(false),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn derives_distinct_addresses_at_each_index() {
		// A well-known test vector xpub (BIP-32 test vector 1, account-level key).
		let xpub = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
		let chain = external_chain(xpub).unwrap();
		let addresses: Vec<String> = (0..5).map(|i| derive_address(&chain, i).unwrap()).collect();
		let mut unique = addresses.clone();
		unique.sort();
		unique.dedup();
		assert_eq!(unique.len(), 5, "derived addresses must be distinct");
	}

	#[test]
	fn has_activity_reads_bool_and_object_shapes() {
		use ledgerflow_providers::TypedRecord;
		let bare = TypedRecord { raw: serde_json::Value::Null, normalized: serde_json::json!(true) };
		assert!(has_activity(&bare));

		let object = TypedRecord { raw: serde_json::Value::Null, normalized: serde_json::json!({"hasTransactions": true}) };
		assert!(has_activity(&object));

		let empty = TypedRecord { raw: serde_json::Value::Null, normalized: serde_json::json!({}) };
		assert!(!has_activity(&empty));
	}
}
