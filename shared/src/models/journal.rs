//! Journal Model

use serde::{Deserialize, Serialize};

/// One append-only journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct JournalLine {
    pub version: String,
    #[cfg_attr(feature = "db", sqlx(rename = "cashregisterid"))]
    pub cash_register_id: String,
    /// ISO local datetime
    pub datetime: String,
    pub text: String,
    #[cfg_attr(feature = "db", sqlx(rename = "userId"))]
    pub user_id: Option<String>,
}
