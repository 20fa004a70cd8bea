use crate::collaborators::BackupError;
use crate::core::config::ConfigError;
use crate::db::DbError;
use crate::receipts::ChainError;
use crate::reports::ClosingError;
use crate::signature::SignatureError;
use serde::Serialize;
use shared::{ErrorCategory, ErrorCode};
use thiserror::Error;

/// 收银机错误 - every failure the fiscal core reports to its caller
#[derive(Debug, Error)]
pub enum FiscalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Closing(#[from] ClosingError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl From<sqlx::Error> for FiscalError {
    fn from(e: sqlx::Error) -> Self {
        Self::Db(DbError::from(e))
    }
}

impl FiscalError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(e) => e.code(),
            Self::Db(e) => e.code(),
            Self::Signature(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::Closing(e) => e.code(),
            Self::Backup(e) => e.code(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_retryable(),
            Self::Db(e) => e.is_retryable(),
            Self::Signature(e) => e.is_retryable(),
            Self::Chain(e) => e.is_retryable(),
            Self::Closing(e) => e.is_retryable(),
            Self::Backup(e) => e.is_retryable(),
        }
    }

    /// Serializable summary for CLI / UI output
    pub fn report(&self) -> ErrorReport {
        let code = self.code();
        ErrorReport {
            code,
            category: code.category(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, FiscalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_through_layers() {
        let damaged: FiscalError =
            ClosingError::Chain(ChainError::Signature(SignatureError::DeviceDamaged("offline".into())))
                .into();
        assert_eq!(damaged.code(), ErrorCode::SignatureDeviceDamaged);
        assert_eq!(damaged.category(), ErrorCategory::DeviceDamaged);
        assert!(damaged.is_retryable());

        let halted: FiscalError = ChainError::Halted.into();
        assert_eq!(halted.category(), ErrorCategory::IntegrityViolation);
        assert!(!halted.is_retryable());

        let conflict: FiscalError = ClosingError::ConcurrencyConflict("eod".into()).into();
        assert!(conflict.is_retryable());
        let report = conflict.report();
        assert_eq!(report.category, ErrorCategory::ConcurrencyConflict);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], 4001);
        assert_eq!(json["category"], "concurrency_conflict");
    }
}
