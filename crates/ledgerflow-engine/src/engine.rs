use std::collections::HashMap;
use std::sync::Arc;

use ledgerflow_ingest::FailoverEngine;
use ledgerflow_processor::Processor;
use ledgerflow_providers::Operation;
use ledgerflow_store::{
	AccountStore, ExcludedTransactionStore, RawDataStore, SessionStore, TransactionRepository,
};
use ledgerflow_types::{Account, Currency, EngineError, SourceType};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::eventbus::EventBus;
use crate::filter::{DustScamClassifier, Verdict};
use crate::orchestrator::{ImportOutcome, IngestionOrchestrator};
use crate::profile::ProcessingProfileRegistry;

/// Result of a `process`/`reprocess` run over one or more accounts (spec §7:
/// "a single structured report — phase, counts, a bounded list of errors").
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
	pub accounts_processed: u64,
	pub rows_processed: u64,
	pub transactions_written: u64,
	pub rows_excluded: u64,
	/// First ~5 errors, by account id (spec §7 "first ~5 errors" report).
	pub errors: Vec<(Uuid, String)>,
}

impl ProcessReport {
	const MAX_ERRORS: usize = 5;

	fn record_error(&mut self, account_id: Uuid, message: String) {
		if self.errors.len() < Self::MAX_ERRORS {
			self.errors.push((account_id, message));
		}
	}

	/// Exit code per spec §6: 0 when nothing failed, 1 otherwise. Invalid
	/// argument handling (exit 2) is the CLI's concern, not the engine's.
	pub fn exit_code(&self) -> i32 {
		if self.errors.is_empty() { 0 } else { 1 }
	}
}

#[derive(Debug, Clone)]
pub struct AssetBalanceCheck {
	pub asset: Currency,
	pub ledger_balance: Decimal,
	pub provider_balance: Decimal,
	pub discrepancy: Decimal,
}

/// Top-level facade wiring every component together (spec §2 data flow:
/// "orchestrator → failover engine → provider client → raw-data store →
/// processor → transaction repository"). This is the one long-lived object
/// the CLI constructs; nothing here is a global singleton (spec §9).
pub struct Engine {
	accounts: AccountStore,
	sessions: SessionStore,
	raw_data: RawDataStore,
	transactions: TransactionRepository,
	excluded: ExcludedTransactionStore,
	failover: Arc<FailoverEngine>,
	events: Arc<EventBus>,
	orchestrator: IngestionOrchestrator,
	profiles: ProcessingProfileRegistry,
	classifiers: Vec<Box<dyn DustScamClassifier>>,
}

impl Engine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		accounts: AccountStore,
		sessions: SessionStore,
		raw_data: RawDataStore,
		transactions: TransactionRepository,
		excluded: ExcludedTransactionStore,
		failover: Arc<FailoverEngine>,
		events: Arc<EventBus>,
		profiles: ProcessingProfileRegistry,
		classifiers: Vec<Box<dyn DustScamClassifier>>,
	) -> Self {
		let orchestrator = IngestionOrchestrator::new(
			accounts.clone(),
			sessions.clone(),
			raw_data.clone(),
			Arc::clone(&failover),
			Arc::clone(&events),
		);
		Self { accounts, sessions, raw_data, transactions, excluded, failover, events, orchestrator, profiles, classifiers }
	}

	pub async fn import_account(
		&self,
		source_name: &str,
		source_type: SourceType,
		identifier: &str,
		provider_name: Option<&str>,
	) -> Result<ImportOutcome, EngineError> {
		self.orchestrator.import_account(source_name, source_type, identifier, provider_name).await
	}

	pub async fn import_extended_key(
		&self,
		source_name: &str,
		xpub: &str,
		gap_limit: Option<u32>,
	) -> Result<ImportOutcome, EngineError> {
		self.orchestrator.import_extended_key(source_name, xpub, gap_limit).await
	}

	/// Processes one account: runs the dust/scam filter over its pending
	/// rows, then hands the rest to the processor (spec §4.7, C10).
	pub async fn process_account(&self, account_id: Uuid) -> Result<ProcessReport, EngineError> {
		let account = self
			.accounts
			.get(account_id)
			.await?
			.ok_or_else(|| EngineError::Other(format!("no such account {account_id}")))?;
		let mut report = ProcessReport::default();
		self.process_one(&account, &mut report).await;
		Ok(report)
	}

	/// Processes every account belonging to the default user (spec §6
	/// `process` with no account id).
	pub async fn process_all(&self) -> Result<ProcessReport, EngineError> {
		let user_id = self.accounts.ensure_default_user().await?;
		let accounts = self.accounts.list_all(user_id).await?;
		let mut report = ProcessReport::default();
		for account in &accounts {
			self.process_one(account, &mut report).await;
		}
		Ok(report)
	}

	/// Deletes an account's transactions and reprocesses its (untouched) raw
	/// rows, reproducing bit-identical transactions (spec §8 scenario S6).
	pub async fn reprocess_account(&self, account_id: Uuid) -> Result<ProcessReport, EngineError> {
		let account = self
			.accounts
			.get(account_id)
			.await?
			.ok_or_else(|| EngineError::Other(format!("no such account {account_id}")))?;
		self.transactions.delete_for_source(&transaction_source_for(&account)).await?;
		self.raw_data.reopen_for_account(account_id).await?;
		let mut report = ProcessReport::default();
		self.process_one(&account, &mut report).await;
		Ok(report)
	}

	async fn process_one(&self, account: &Account, report: &mut ProcessReport) {
		report.accounts_processed += 1;

		if let Err(error) = self.apply_filters(account, report).await {
			report.record_error(account.id, error.to_string());
			return;
		}

		let profile = match self.profiles.get(&account.source_name) {
			Some(profile) => profile,
			None => {
				report.record_error(account.id, format!("no processing profile declared for source '{}'", account.source_name));
				return;
			}
		};

		let processor = Processor::new(self.raw_data.clone(), self.transactions.clone(), self.sessions.clone());

		match processor
			.process_account(
				account.id,
				&transaction_source_for(account),
				profile.grouping,
				profile.batching.as_ref(),
				profile.strategy.as_ref(),
			)
			.await
		{
			Ok(outcome) => {
				report.rows_processed += outcome.rows_processed;
				report.transactions_written += outcome.transactions_written;
			}
			Err(error) => report.record_error(account.id, error.to_string()),
		}
	}

	/// Runs the registered dust/scam classifiers over an account's still-
	/// pending rows, recording excluded rows and marking them processed so
	/// the processor never sees them (spec §2 C10). A row clean by every
	/// classifier is left untouched for the processor to pick up.
	async fn apply_filters(&self, account: &Account, report: &mut ProcessReport) -> Result<(), EngineError> {
		if self.classifiers.is_empty() {
			return Ok(());
		}

		let rows = self.raw_data.pending_for_account(account.id, 5_000).await?;
		let mut excluded_ids = Vec::new();

		for row in &rows {
			let fields = match ledgerflow_processor::parse_row(row) {
				Ok(fields) => fields,
				Err(_) => continue,
			};
			// Scoped to inflows only (spec §2 C10): an outgoing withdrawal or a
			// standalone fee row is never a dust/scam candidate, and excluding one
			// would strip it out from under its principal transaction.
			if fields.is_fee_row || !fields.amount.is_sign_positive() {
				continue;
			}
			let movement = ledgerflow_types::AssetMovement::new(fields.asset, fields.amount.abs(), fields.amount.abs());

			for classifier in &self.classifiers {
				if let Verdict::Excluded(reason) = classifier.classify(&movement).await {
					let classifier_name = match &reason {
						crate::filter::ExcludeReason::Dust => "dust",
						crate::filter::ExcludeReason::Scam { classifier_name } => classifier_name.as_str(),
					};
					self.excluded.record(account.id, row.id, classifier_name, Some(classifier.name())).await?;
					excluded_ids.push(row.id);
					break;
				}
			}
		}

		if !excluded_ids.is_empty() {
			report.rows_excluded += excluded_ids.len() as u64;
			self.raw_data.mark_processed(&excluded_ids).await?;
		}
		Ok(())
	}

	/// Compares the ledger's computed balance per asset against a live
	/// one-shot balance call (spec §6 `verify-balance`). The provider's
	/// response is expected to normalize to a JSON object of
	/// `{ asset: decimalString }`, the simplest shape a `getAddressBalances`
	/// client can validate against its schema.
	pub async fn verify_balance(&self, account_id: Uuid, blockchain_or_exchange: &str) -> Result<Vec<AssetBalanceCheck>, EngineError> {
		let account = self
			.accounts
			.get(account_id)
			.await?
			.ok_or_else(|| EngineError::Other(format!("no such account {account_id}")))?;

		let ledger_balances = self.ledger_balances(&account).await?;

		let record = self
			.failover
			.execute_once(
				Operation::GetAddressBalances,
				blockchain_or_exchange,
				&account.identifier,
				account.provider_name.as_deref(),
			)
			.await?;
		let provider_balances: HashMap<String, Decimal> = record
			.normalized
			.as_object()
			.map(|object| {
				object
					.iter()
					.filter_map(|(asset, value)| {
						value.as_str().and_then(|s| s.parse::<Decimal>().ok()).map(|amount| (asset.clone(), amount))
					})
					.collect()
			})
			.unwrap_or_default();

		let mut checks = Vec::new();
		for (asset, ledger_balance) in ledger_balances {
			let provider_balance = provider_balances.get(asset.as_str()).copied().unwrap_or(Decimal::ZERO);
			checks.push(AssetBalanceCheck {
				discrepancy: ledger_balance - provider_balance,
				asset,
				ledger_balance,
				provider_balance,
			});
		}
		Ok(checks)
	}

	/// Sums `net_for_asset` across every transaction recorded for `account`,
	/// giving the ledger's own view of its on-chain/exchange balance per
	/// asset.
	async fn ledger_balances(&self, account: &Account) -> Result<HashMap<Currency, Decimal>, EngineError> {
		let transactions = self.transactions.list_by_source(&transaction_source_for(account)).await?;
		let mut balances: HashMap<Currency, Decimal> = HashMap::new();
		for tx in &transactions {
			for asset in distinct_assets(tx) {
				let net = tx.net_for_asset(&asset);
				*balances.entry(asset).or_insert(Decimal::ZERO) += net;
			}
		}
		Ok(balances)
	}

	/// Exposes the shared event bus so a CLI or other consumer can subscribe
	/// to progress envelopes (spec §4.9).
	pub fn events(&self) -> &EventBus {
		&self.events
	}
}

fn distinct_assets(tx: &ledgerflow_types::UniversalTransaction) -> Vec<Currency> {
	let mut assets: Vec<Currency> = tx
		.movements
		.inflows
		.iter()
		.chain(tx.movements.outflows.iter())
		.map(|m| m.asset.clone())
		.collect();
	assets.sort();
	assets.dedup();
	assets
}

/// The string used as `UniversalTransaction.source` / the transaction
/// repository's upsert-key namespace for one account. Plain `source_name`
/// would collide across two accounts of the same source (e.g. two Kraken
/// accounts), so it's qualified by the account's own identifier.
fn transaction_source_for(account: &Account) -> String {
	format!("{}:{}", account.source_name, account.identifier)
}
