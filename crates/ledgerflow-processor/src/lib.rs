//! Normalises raw provider rows into canonical transactions: correlation,
//! amount-semantics interpretation, operation classification, zero-sum
//! tolerance checks and batched persistence (spec §4.7).

mod batch;
mod classify;
mod fields;
mod grouping;
mod processor;
mod strategy;
mod tolerance;

pub use batch::{AllAtOnce, BatchProvider, HashGrouped, MultiStreamZipped};
pub use classify::classify_operation;
pub use fields::{parse_row, RowFields};
pub use grouping::GroupingStrategy;
pub use processor::{Processor, ProcessingOutcome};
pub use strategy::{GrossAmountsStrategy, InterpretationStrategy, InterpretedGroup, StandardAmounts};
pub use tolerance::{check_zero_sum, ToleranceConfig};
