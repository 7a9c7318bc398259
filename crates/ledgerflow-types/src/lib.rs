//! Canonical domain model shared by every component of the ledgerflow
//! ingestion and processing engine.
//!
//! Nothing in this crate talks to the network or a database; it only
//! describes the shapes that flow between components, and the invariants
//! those shapes must uphold (enforced via constructors / `try_*` methods
//! rather than public mutable fields where an invariant would otherwise be
//! easy to violate).

mod account;
mod cursor;
mod currency;
mod error;
mod money;
mod provider;
mod raw_record;
mod session;
mod transaction;

pub use account::{Account, SourceType};
pub use cursor::{Cursor, CursorMeta, CursorPosition, CursorType};
pub use currency::Currency;
pub use error::{EngineError, ProcessorError, ProviderError, StoreError};
pub use money::Money;
pub use provider::{CircuitState, ProviderHealth};
pub use raw_record::{ProcessedState, RawRecord, StreamType};
pub use session::{ImportSession, SessionStatus};
pub use transaction::{
	AssetMovement, Blockchain, Fee, FeeScope, FeeSettlement, Movements, Operation,
	OperationCategory, TxStatus, UniversalTransaction,
};
