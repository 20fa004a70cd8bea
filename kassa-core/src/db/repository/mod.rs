//! Repository Module
//!
//! Free functions over a `SqliteConnection`, so the same call works on a
//! pooled connection and inside an open transaction.

pub mod globals;
pub mod journal;
pub mod orders;
pub mod receipts;
pub mod reports;

use super::{DbError, DbResult};
use rust_decimal::Decimal;

/// Parse a decimal TEXT column
pub(crate) fn parse_decimal(column: &str, text: &str) -> DbResult<Decimal> {
    shared::money::parse_amount(text)
        .ok_or_else(|| DbError::Corrupt(format!("{column} is not a decimal: {text:?}")))
}

/// Parse a timestamp TEXT column
pub(crate) fn parse_timestamp(column: &str, text: &str) -> DbResult<chrono::NaiveDateTime> {
    shared::util::parse_ts(text)
        .ok_or_else(|| DbError::Corrupt(format!("{column} is not a timestamp: {text:?}")))
}
