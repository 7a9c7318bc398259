use ledgerflow_types::{ProcessedState, SourceType, StreamType, StoreError};

pub fn source_type_to_text(s: SourceType) -> &'static str {
	match s {
		SourceType::Blockchain => "blockchain",
		SourceType::ExchangeApi => "exchange_api",
		SourceType::ExchangeCsv => "exchange_csv",
	}
}

pub fn source_type_from_text(s: &str) -> Result<SourceType, StoreError> {
	match s {
		"blockchain" => Ok(SourceType::Blockchain),
		"exchange_api" => Ok(SourceType::ExchangeApi),
		"exchange_csv" => Ok(SourceType::ExchangeCsv),
		other => Err(StoreError::Db(format!("unrecognised source_type '{other}' in storage"))),
	}
}

pub fn stream_type_to_text(s: &StreamType) -> &'static str {
	match s {
		StreamType::Normal => "normal",
		StreamType::Token => "token",
		StreamType::Internal => "internal",
		StreamType::Ledger => "ledger",
	}
}

pub fn stream_type_from_text(s: &str) -> Result<StreamType, StoreError> {
	match s {
		"normal" => Ok(StreamType::Normal),
		"token" => Ok(StreamType::Token),
		"internal" => Ok(StreamType::Internal),
		"ledger" => Ok(StreamType::Ledger),
		other => Err(StoreError::Db(format!("unrecognised stream_type '{other}' in storage"))),
	}
}

pub fn processed_state(processed_at: Option<chrono::DateTime<chrono::Utc>>) -> ProcessedState {
	match processed_at {
		Some(_) => ProcessedState::Processed,
		None => ProcessedState::Pending,
	}
}
