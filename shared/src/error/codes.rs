//! Fiscal error codes
//!
//! All error codes are represented as u16 values so they survive logs, the
//! journal and any wrapping UI unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid input (malformed key, passphrase, ciphertext encoding)
    InvalidInput = 4,

    // ==================== 1xxx: Configuration ====================
    /// No signature device configured, running with the null module
    SignatureNotConfigured = 1001,
    /// Configuration value could not be parsed
    InvalidConfiguration = 1002,

    // ==================== 2xxx: Integrity ====================
    /// Signature chain does not link to its predecessor
    ChainMismatch = 2001,
    /// Turnover counter could not be decrypted or is inconsistent
    CounterIntegrity = 2002,
    /// Receipt creation halted after an integrity violation
    ReceiptCreationHalted = 2003,

    // ==================== 3xxx: Signature device ====================
    /// Signature device or signing service failed
    SignatureDeviceDamaged = 3001,
    /// Signing service timed out
    SignatureTimeout = 3002,

    // ==================== 4xxx: Concurrency ====================
    /// Another closing or receipt is in flight
    ConcurrencyConflict = 4001,

    // ==================== 5xxx: Closing ====================
    /// A closing must be produced before this operation
    ClosingRequired = 5001,
    /// The business day is already closed
    DayAlreadyClosed = 5002,
    /// The day closing must be produced before the month closing
    DayClosingRequired = 5003,
    /// Nothing to close for the requested window
    NothingToClose = 5004,
    /// Backup before closing failed
    BackupFailed = 5005,
    /// Receipt cannot be voided
    StornoRejected = 5006,
    /// Receipt time lies before the most recent receipt of the chain
    TimestampOutOfOrder = 5007,

    // ==================== 9xxx: Transaction / System ====================
    /// Database step failed, transaction rolled back
    TransactionFailure = 9001,
    /// Internal error
    InternalError = 9002,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Short English message for the code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Not found",
            Self::InvalidInput => "Invalid input",
            Self::SignatureNotConfigured => "No signature device configured",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::ChainMismatch => "Signature chain mismatch",
            Self::CounterIntegrity => "Turnover counter integrity violated",
            Self::ReceiptCreationHalted => "Receipt creation halted",
            Self::SignatureDeviceDamaged => "Signature device damaged",
            Self::SignatureTimeout => "Signature service timed out",
            Self::ConcurrencyConflict => "Concurrent operation in progress",
            Self::ClosingRequired => "Closing required",
            Self::DayAlreadyClosed => "Business day already closed",
            Self::DayClosingRequired => "Day closing required first",
            Self::NothingToClose => "Nothing to close",
            Self::BackupFailed => "Backup failed",
            Self::StornoRejected => "Storno rejected",
            Self::TimestampOutOfOrder => "Receipt time precedes the last receipt",
            Self::TransactionFailure => "Transaction failed",
            Self::InternalError => "Internal error",
        }
    }

    /// Whether the operation may simply be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            super::ErrorCategory::DeviceDamaged
                | super::ErrorCategory::ConcurrencyConflict
                | super::ErrorCategory::TransactionFailure
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when converting an unknown u16 into [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid error code: {0}")]
pub struct InvalidErrorCode(pub u16);

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::ValidationFailed,
            3 => Self::NotFound,
            4 => Self::InvalidInput,
            1001 => Self::SignatureNotConfigured,
            1002 => Self::InvalidConfiguration,
            2001 => Self::ChainMismatch,
            2002 => Self::CounterIntegrity,
            2003 => Self::ReceiptCreationHalted,
            3001 => Self::SignatureDeviceDamaged,
            3002 => Self::SignatureTimeout,
            4001 => Self::ConcurrencyConflict,
            5001 => Self::ClosingRequired,
            5002 => Self::DayAlreadyClosed,
            5003 => Self::DayClosingRequired,
            5004 => Self::NothingToClose,
            5005 => Self::BackupFailed,
            5006 => Self::StornoRejected,
            5007 => Self::TimestampOutOfOrder,
            9001 => Self::TransactionFailure,
            9002 => Self::InternalError,
            other => return Err(InvalidErrorCode(other)),
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(ErrorCode::InvalidInput.to_string(), "E0004");
        assert_eq!(ErrorCode::ChainMismatch.to_string(), "E2001");
    }

    #[test]
    fn test_try_from_u16() {
        assert_eq!(ErrorCode::try_from(3001), Ok(ErrorCode::SignatureDeviceDamaged));
        assert_eq!(ErrorCode::try_from(4242), Err(InvalidErrorCode(4242)));
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::DayAlreadyClosed).unwrap();
        assert_eq!(json, "5002");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::DayAlreadyClosed);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::SignatureDeviceDamaged.is_retryable());
        assert!(ErrorCode::ConcurrencyConflict.is_retryable());
        assert!(!ErrorCode::ChainMismatch.is_retryable());
        assert!(!ErrorCode::DayClosingRequired.is_retryable());
    }
}
