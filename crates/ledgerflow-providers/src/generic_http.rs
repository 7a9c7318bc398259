use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ledgerflow_types::{Cursor, CursorMeta, CursorPosition, CursorType};
use serde_json::Value;

use crate::capability::{Capabilities, Operation};
use crate::client::{BatchResult, ClientError, ProviderClient, TypedRecord};

/// A `ProviderClient` for providers that speak a conventional paginated-JSON
/// dialect rather than a bespoke one: one-shot operations return their body
/// verbatim as the normalized record (spec §4.1 leaves wire shapes to the
/// provider; `GetAddressBalances` callers expect `{ asset: decimalString }`,
/// which this dialect satisfies directly), and streaming operations return
/// `{ "records": [...], "cursor": "...", "isComplete": bool }`.
///
/// Bespoke providers whose wire format doesn't fit this convention implement
/// `ProviderClient` directly, the way the teacher has one concrete client per
/// RPC dialect (`BtcRpcClient`, `EllipticClient`) rather than forcing every
/// integration through one shape.
pub struct GenericHttpClient {
	name: String,
	http: reqwest::Client,
	base_url: String,
	timeout: Duration,
	api_key_env_var: Option<String>,
	capabilities: Capabilities,
	one_shot_paths: HashMap<Operation, String>,
	stream_path: Option<String>,
}

impl GenericHttpClient {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		name: impl Into<String>,
		base_url: impl Into<String>,
		capabilities: Capabilities,
		timeout: Duration,
		api_key_env_var: Option<String>,
		one_shot_paths: HashMap<Operation, String>,
		stream_path: Option<String>,
	) -> Self {
		Self {
			name: name.into(),
			http: reqwest::Client::new(),
			base_url: base_url.into(),
			timeout,
			api_key_env_var,
			capabilities,
			one_shot_paths,
			stream_path,
		}
	}

	fn path_for(&self, template: &str, account_identifier: &str) -> String {
		format!("{}{}", self.base_url, template.replace("{identifier}", account_identifier))
	}

	fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		if let Some(env_var) = &self.api_key_env_var {
			if let Ok(key) = std::env::var(env_var) {
				request = request.bearer_auth(key);
			}
		}
		request
	}

	async fn fetch_json(&self, url: &str, query: Option<(&str, &str)>) -> Result<Value, ClientError> {
		let mut request = self.authorize(self.http.get(url).timeout(self.timeout));
		if let Some((key, value)) = query {
			request = request.query(&[(key, value)]);
		}
		let response = request.send().await.map_err(|e| ClientError::Transport { provider: self.name.clone(), message: e.to_string() })?;
		if !response.status().is_success() {
			return Err(ClientError::Transport { provider: self.name.clone(), message: format!("http status {}", response.status()) });
		}
		response
			.json::<Value>()
			.await
			.map_err(|e| ClientError::SchemaValidation { provider: self.name.clone(), schema_path: url.to_string(), message: e.to_string() })
	}
}

#[async_trait]
impl ProviderClient for GenericHttpClient {
	fn name(&self) -> &str {
		&self.name
	}

	fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	async fn execute(&self, op: Operation, account_identifier: &str) -> Result<TypedRecord, ClientError> {
		let template = self.one_shot_paths.get(&op).ok_or(ClientError::UnsupportedOperation(op))?;
		let url = self.path_for(template, account_identifier);
		let body = self.fetch_json(&url, None).await?;
		Ok(TypedRecord { raw: body.clone(), normalized: body })
	}

	async fn execute_streaming_batch(
		&self,
		op: Operation,
		account_identifier: &str,
		resume_cursor: Option<&Cursor>,
	) -> Result<BatchResult, ClientError> {
		let template = self.stream_path.as_deref().ok_or(ClientError::UnsupportedOperation(op))?;
		let url = self.path_for(template, account_identifier);
		let query = resume_cursor.map(|cursor| ("cursor", cursor.primary.value.as_str()));
		let body = self.fetch_json(&url, query).await?;

		let records = body.get("records").and_then(Value::as_array).cloned().unwrap_or_default();
		let data: Vec<TypedRecord> = records.into_iter().map(|record| TypedRecord { raw: record.clone(), normalized: record }).collect();
		let next_token = body.get("cursor").and_then(Value::as_str).unwrap_or_default().to_string();
		let is_complete = body.get("isComplete").and_then(Value::as_bool).unwrap_or(true);

		let primary = CursorPosition::page_token(self.name.clone(), next_token);
		let meta = CursorMeta { provider_name: self.name.clone(), updated_at: Utc::now(), is_complete: Some(is_complete) };
		let mut cursor = Cursor::new(primary, meta);
		cursor.total_fetched = resume_cursor.map(|c| c.total_fetched).unwrap_or(0) + data.len() as u64;
		cursor.last_record_id = data.last().and_then(|r| r.normalized.get("eventId")).and_then(Value::as_str).map(str::to_string);
		let fetched = data.len();

		Ok(BatchResult { data, cursor, is_complete, fetched, yielded: fetched })
	}

	/// The generic dialect carries no declared universal-cursor fields, so
	/// there are no alternatives to extract; a bespoke client grounded in a
	/// real provider's record shape would populate this.
	fn extract_cursors(&self, _record: &TypedRecord) -> Vec<Cursor> {
		Vec::new()
	}

	fn apply_replay_window(&self, mut cursor: Cursor) -> Cursor {
		if cursor.primary.cursor_type == CursorType::BlockNumber {
			if let (Some(blocks), Ok(height)) = (self.capabilities.replay_window.blocks, cursor.primary.value.parse::<u64>()) {
				cursor.primary.value = height.saturating_sub(blocks).to_string();
			}
		}
		cursor
	}

	async fn is_healthy(&self) -> bool {
		self.http
			.get(&self.base_url)
			.timeout(Duration::from_secs(3))
			.send()
			.await
			.map(|response| response.status().is_success())
			.unwrap_or(false)
	}
}
