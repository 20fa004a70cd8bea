use shared::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key hex malformed or key of the wrong length
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// Malformed input (empty passphrase, bad encoding)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Authentication tag mismatch: wrong key, wrong context or tampered data
    #[error("Integrity check failed: {0}")]
    Integrity(String),
    #[error("Encryption failed: {0}")]
    Encryption(String),
}

impl CryptoError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidKey(_) | Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Integrity(_) => ErrorCode::CounterIntegrity,
            Self::Encryption(_) => ErrorCode::InternalError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
