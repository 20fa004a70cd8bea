//! Shared types for the Kassa fiscal core
//!
//! Common types used across the workspace crates: the receipt / closing /
//! journal domain model, unified error codes, money and time helpers.

pub mod error;
pub mod models;
pub mod money;
pub mod util;

// Re-exports
pub use error::{ErrorCategory, ErrorCode};
pub use models::{
    ClosingKind, ClosingRecord, JournalLine, OrderLine, PayedBy, Receipt, ReportSection,
    StornoState, TaxBracket, TaxBracketSums,
};
pub use serde::{Deserialize, Serialize};
