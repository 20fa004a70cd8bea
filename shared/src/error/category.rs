//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories follow the fiscal failure taxonomy:
/// - 0xxx: General errors
/// - 1xxx: Configuration errors (degrade to the null signature module)
/// - 2xxx: Integrity violations (fatal, halt receipt creation)
/// - 3xxx: Device damaged (blocks closings, retryable)
/// - 4xxx: Concurrency conflicts (retry later)
/// - 5xxx: Closing refusals (operator decision)
/// - 9xxx: Transaction failures (always fully rolled back)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Configuration errors (1xxx)
    Configuration,
    /// Integrity violations (2xxx)
    IntegrityViolation,
    /// Signature device damaged (3xxx)
    DeviceDamaged,
    /// Concurrency conflicts (4xxx)
    ConcurrencyConflict,
    /// Closing refusals (5xxx)
    Closing,
    /// Transaction failures (9xxx)
    TransactionFailure,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Configuration,
            2000..3000 => Self::IntegrityViolation,
            3000..4000 => Self::DeviceDamaged,
            4000..5000 => Self::ConcurrencyConflict,
            5000..6000 => Self::Closing,
            _ => Self::TransactionFailure,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Configuration => "configuration",
            Self::IntegrityViolation => "integrity_violation",
            Self::DeviceDamaged => "device_damaged",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Closing => "closing",
            Self::TransactionFailure => "transaction_failure",
        }
    }

    /// Integrity violations stop all further receipt creation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IntegrityViolation)
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}
