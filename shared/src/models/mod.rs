//! Fiscal domain model
//!
//! Receipts, order lines, closing records and journal lines as they are
//! persisted by the core.

pub mod journal;
pub mod order;
pub mod receipt;
pub mod report;

pub use journal::JournalLine;
pub use order::{OrderLine, TaxBracket, TaxBracketSums};
pub use receipt::{PayedBy, Receipt, StornoState};
pub use report::{ClosingKind, ClosingRecord, ReportSection};
