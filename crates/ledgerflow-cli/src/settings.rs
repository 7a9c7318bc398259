use std::collections::HashMap;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Command-line flags that can override the layered config (spec §6: "every
/// setting is overridable by an environment variable or flag"). Grounded on
/// the teacher's `CLICommandLineOptions` (`engine/cli/src/settings.rs`): a
/// thin clap struct carrying only a config path plus the subcommand.
#[derive(Parser, Clone)]
#[command(name = "ledgerflow", about = "Personal crypto accounting ingestion and processing engine")]
pub struct CliOptions {
	#[arg(short = 'c', long = "config-path", env = "LEDGERFLOW_CONFIG_PATH")]
	pub config_path: Option<String>,

	#[command(subcommand)]
	pub cmd: Command,
}

#[derive(clap::Subcommand, Clone)]
pub enum Command {
	/// Imports a blockchain address, an extended public key, an exchange API
	/// account, or an exchange CSV export (spec §6 `import`).
	Import {
		#[command(subcommand)]
		kind: ImportKind,
	},
	/// Runs the filter and processor over one account, or every account if
	/// none is given (spec §6 `process`).
	Process {
		account_id: Option<uuid::Uuid>,
	},
	/// Deletes an account's transactions and regenerates them from its raw
	/// rows (spec §6 `reprocess`).
	Reprocess {
		account_id: Option<uuid::Uuid>,
	},
	/// Compares the ledger's computed balance against a live provider call
	/// (spec §6 `verify-balance`).
	VerifyBalance {
		account_id: uuid::Uuid,
		blockchain_or_exchange: String,
	},
	/// Lists persisted transactions, optionally filtered (spec §6
	/// `transactions view`).
	Transactions {
		#[command(subcommand)]
		action: TransactionsAction,
	},
}

#[derive(clap::Subcommand, Clone)]
pub enum ImportKind {
	Blockchain {
		source_name: String,
		#[arg(long)]
		xpub: Option<String>,
		#[arg(long)]
		address: Option<String>,
		#[arg(long)]
		gap_limit: Option<u32>,
	},
	ExchangeApi {
		source_name: String,
		identifier: String,
		#[arg(long)]
		provider_name: Option<String>,
	},
	ExchangeCsv {
		source_name: String,
		identifier: String,
		#[arg(long)]
		provider_name: Option<String>,
	},
}

#[derive(clap::Subcommand, Clone)]
pub enum TransactionsAction {
	View {
		source: String,
		#[arg(long)]
		external_id: Option<String>,
	},
}

fn default_log_filter() -> String {
	"info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
	pub url: String,
}

impl Default for DatabaseSettings {
	fn default() -> Self {
		Self { url: "postgres://localhost/ledgerflow".to_string() }
	}
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilterSettings {
	/// Per-asset dust thresholds, decimal strings keyed by currency code
	/// (spec §2 C10).
	#[serde(default)]
	pub dust_thresholds: HashMap<String, String>,
	#[serde(default)]
	pub scam_classifier_endpoint: Option<String>,
	#[serde(default)]
	pub scam_classifier_api_key_env: Option<String>,
	#[serde(default)]
	pub scam_risk_threshold: Option<f64>,
}

/// One entry in `providers`: enough to build a `ProviderMetadata` plus a
/// `GenericHttpClient` wired to the dialect described in
/// `ledgerflow_providers::generic_http`. A provider whose wire format
/// doesn't fit that dialect is registered by application code calling
/// `ledgerflow-providers` directly instead of going through config.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
	pub name: String,
	pub blockchain_or_exchange: String,
	pub base_url: String,
	#[serde(default)]
	pub requires_api_key: bool,
	#[serde(default)]
	pub api_key_env_var: Option<String>,
	#[serde(default)]
	pub priority: u32,
	/// Operation name (camelCase, matching `Operation`'s serde rename) to
	/// the templated one-shot path, e.g. `{ "getAddressBalances": "/v1/{identifier}/balances" }`.
	#[serde(default)]
	pub one_shot_paths: HashMap<String, String>,
	#[serde(default)]
	pub stream_operation: Option<String>,
	#[serde(default)]
	pub stream_path: Option<String>,
	#[serde(default)]
	pub replay_window_blocks: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(default)]
	pub database: DatabaseSettings,
	#[serde(default)]
	pub providers: Vec<ProviderSettings>,
	#[serde(default)]
	pub filters: FilterSettings,
	#[serde(default = "default_log_filter")]
	pub log_filter: String,
}

impl Settings {
	/// Layers `config/default.toml` (optional), an explicit config path
	/// (optional), then `LEDGERFLOW__*` environment overrides, the same
	/// file-then-env layering as the teacher's `CLISettings::from_file_and_env`
	/// adapted to the modern `config` builder API.
	pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
		let mut builder = Config::builder()
			.set_default("database.url", "postgres://localhost/ledgerflow")?
			.set_default("log_filter", "info")?
			.add_source(File::with_name("config/default").required(false));

		if let Some(path) = config_path {
			builder = builder.add_source(File::with_name(path).required(true));
		}

		builder
			.add_source(Environment::with_prefix("LEDGERFLOW").separator("__"))
			.build()?
			.try_deserialize()
	}
}
