mod providers;
mod settings;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ledgerflow_engine::{DustScamClassifier, DustThresholdClassifier, Engine, HttpScamClassifier, ProcessingProfileRegistry};
use ledgerflow_ingest::FailoverEngine;
use ledgerflow_providers::{CircuitBreaker, CircuitBreakerConfig, ResponseCache};
use ledgerflow_store::{AccountStore, ExcludedTransactionStore, ProviderStatsStore, RawDataStore, SessionStore, TransactionRepository};
use ledgerflow_types::{Currency, SourceType};
use rust_decimal::Decimal;
use settings::{Command, ImportKind, Settings, TransactionsAction};
use sqlx::postgres::PgPoolOptions;

use crate::settings::CliOptions;

#[tokio::main]
async fn main() {
	std::process::exit(match run().await {
		Ok(code) => code,
		Err(err) => {
			eprintln!("Error: {:?}", err);
			1
		}
	})
}

async fn run() -> Result<i32> {
	let opts = CliOptions::parse();
	let settings = Settings::load(opts.config_path.as_deref())
		.map_err(|err| anyhow!("failed to load configuration (config file or LEDGERFLOW__* env vars): {err}"))?;

	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::new(&settings.log_filter))
		.init();

	let pool = PgPoolOptions::new()
		.max_connections(10)
		.connect(&settings.database.url)
		.await
		.context("failed to connect to the database")?;
	ledgerflow_store::run_migrations(&pool).await.context("failed to run database migrations")?;

	let engine = build_engine(&pool, &settings).await?;

	match opts.cmd {
		Command::Import { kind } => run_import(&engine, kind).await,
		Command::Process { account_id } => run_process(&engine, account_id).await,
		Command::Reprocess { account_id } => run_reprocess(&engine, account_id).await,
		Command::VerifyBalance { account_id, blockchain_or_exchange } => {
			run_verify_balance(&engine, account_id, &blockchain_or_exchange).await
		}
		Command::Transactions { action } => run_transactions(&pool, action).await,
	}
}

async fn build_engine(pool: &sqlx::PgPool, settings: &Settings) -> Result<Engine> {
	let accounts = AccountStore::new(pool.clone());
	let sessions = SessionStore::new(pool.clone());
	let raw_data = RawDataStore::new(pool.clone());
	let transactions = TransactionRepository::new(pool.clone());
	let excluded = ExcludedTransactionStore::new(pool.clone());

	let registry = providers::build_registry(&settings.providers)?;
	let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
	let cache = ResponseCache::new(std::time::Duration::from_secs(30));
	let stats_store = ProviderStatsStore::new(pool.clone());

	let failover = FailoverEngine::new(registry, circuit_breaker, cache);
	failover.seed_health(&stats_store).await.context("failed to restore provider health from storage")?;
	let failover = Arc::new(failover.with_stats_store(stats_store));

	let (events, _receiver) = ledgerflow_engine::EventBus::new(256);
	let events = Arc::new(events);

	let profiles = ProcessingProfileRegistry::with_defaults();
	let classifiers = build_classifiers(&settings.filters)?;

	Ok(Engine::new(accounts, sessions, raw_data, transactions, excluded, failover, events, profiles, classifiers))
}

fn build_classifiers(filters: &settings::FilterSettings) -> Result<Vec<Box<dyn DustScamClassifier>>> {
	let mut classifiers: Vec<Box<dyn DustScamClassifier>> = Vec::new();

	if !filters.dust_thresholds.is_empty() {
		let mut thresholds: HashMap<Currency, Decimal> = HashMap::new();
		for (asset, amount) in &filters.dust_thresholds {
			let amount: Decimal = amount.parse().with_context(|| format!("invalid dust threshold for {asset}: '{amount}'"))?;
			thresholds.insert(Currency::new(asset.clone()), amount);
		}
		classifiers.push(Box::new(DustThresholdClassifier { thresholds }));
	}

	if let Some(endpoint) = &filters.scam_classifier_endpoint {
		let api_key = filters.scam_classifier_api_key_env.as_ref().and_then(|var| std::env::var(var).ok());
		let threshold = filters.scam_risk_threshold.unwrap_or(0.8);
		classifiers.push(Box::new(HttpScamClassifier::new(endpoint.clone(), api_key, threshold)));
	}

	Ok(classifiers)
}

async fn run_import(engine: &Engine, kind: ImportKind) -> Result<i32> {
	let outcome = match kind {
		ImportKind::Blockchain { source_name, xpub, address, gap_limit } => match (xpub, address) {
			(Some(xpub), None) => engine.import_extended_key(&source_name, &xpub, gap_limit).await,
			(None, Some(address)) => engine.import_account(&source_name, SourceType::Blockchain, &address, None).await,
			_ => return Err(anyhow!("import blockchain requires exactly one of --xpub or --address")),
		},
		ImportKind::ExchangeApi { source_name, identifier, provider_name } => {
			engine.import_account(&source_name, SourceType::ExchangeApi, &identifier, provider_name.as_deref()).await
		}
		ImportKind::ExchangeCsv { source_name, identifier, provider_name } => {
			engine.import_account(&source_name, SourceType::ExchangeCsv, &identifier, provider_name.as_deref()).await
		}
	};

	match outcome {
		Ok(outcome) => {
			println!("imported {} rows, {} already present", outcome.imported, outcome.skipped);
			Ok(0)
		}
		Err(err) => {
			eprintln!("import failed: {err}");
			Ok(1)
		}
	}
}

async fn run_process(engine: &Engine, account_id: Option<uuid::Uuid>) -> Result<i32> {
	let report = match account_id {
		Some(id) => engine.process_account(id).await?,
		None => engine.process_all().await?,
	};
	print_report(&report);
	Ok(report.exit_code())
}

async fn run_reprocess(engine: &Engine, account_id: Option<uuid::Uuid>) -> Result<i32> {
	let Some(account_id) = account_id else {
		eprintln!("Error: reprocess requires an account id");
		return Ok(2);
	};
	let report = engine.reprocess_account(account_id).await?;
	print_report(&report);
	Ok(report.exit_code())
}

fn print_report(report: &ledgerflow_engine::ProcessReport) {
	println!(
		"accounts processed: {}, rows processed: {}, transactions written: {}, rows excluded: {}",
		report.accounts_processed, report.rows_processed, report.transactions_written, report.rows_excluded
	);
	for (account_id, message) in &report.errors {
		eprintln!("error on account {account_id}: {message}");
	}
}

async fn run_verify_balance(engine: &Engine, account_id: uuid::Uuid, blockchain_or_exchange: &str) -> Result<i32> {
	let checks = engine.verify_balance(account_id, blockchain_or_exchange).await?;
	let mut exit_code = 0;
	for check in &checks {
		if check.discrepancy != Decimal::ZERO {
			exit_code = 1;
		}
		println!(
			"{}: ledger {} vs provider {} (discrepancy {})",
			check.asset, check.ledger_balance, check.provider_balance, check.discrepancy
		);
	}
	Ok(exit_code)
}

async fn run_transactions(pool: &sqlx::PgPool, action: TransactionsAction) -> Result<i32> {
	let transactions = TransactionRepository::new(pool.clone());
	match action {
		TransactionsAction::View { source, external_id } => {
			if let Some(external_id) = external_id {
				match transactions.get(&source, &external_id).await? {
					Some(t) => println!("{}", serde_json::to_string_pretty(&to_json(&t))?),
					None => println!("no transaction found for {source}/{external_id}"),
				}
			} else {
				for t in transactions.list_by_source(&source).await? {
					println!("{}", serde_json::to_string_pretty(&to_json(&t))?);
				}
			}
		}
	}
	Ok(0)
}

fn to_json(t: &ledgerflow_types::UniversalTransaction) -> serde_json::Value {
	serde_json::json!({
		"id": t.id,
		"source": t.source,
		"externalId": t.external_id,
		"datetime": t.datetime,
		"status": format!("{:?}", t.status),
		"operationType": t.operation.op_type,
		"movements": t.movements,
		"fees": t.fees,
		"blockchain": t.blockchain,
		"note": t.note,
	})
}
