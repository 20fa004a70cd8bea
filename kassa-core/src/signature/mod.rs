//! Signature Module (签名模块)
//!
//! Produces the chained signature of every receipt. Three variants share one
//! capability trait and are selected once at startup:
//!
//! - [`NullSignature`] - no device configured, placeholder signatures
//! - [`StandaloneSignature`] - local HMAC-SHA256 signing
//! - [`OnlineSignature`] - signature obtained from a remote signing service
//!
//! Every link carries the chain value of its predecessor's signature string
//! and (for Standalone / Online) the encrypted turnover counter.

pub mod code;
mod coder;
mod null;
mod online;
mod standalone;
mod verify;

pub use code::{SIGNATURE_DAMAGED_MARKER, SignedCode, ocr_code};
pub use null::NullSignature;
pub use online::{HttpRemoteSigner, OnlineSignature, RemoteSigner};
pub use standalone::StandaloneSignature;
pub use verify::{ChainReport, verify_chain};

use crate::core::config::{SignatureConfig, SignatureMode};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use kassa_crypto::{CryptoError, SecureBytes};
use shared::ErrorCode;
use shared::models::{PayedBy, Receipt, TaxBracketSums};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    /// Not configured or not constructible; the register falls back to Null
    #[error("Signature device unavailable: {0}")]
    Unavailable(String),

    #[error("Signature device damaged: {0}")]
    DeviceDamaged(String),

    #[error("Signature service timed out after {0} ms")]
    Timeout(u64),

    #[error("Integrity violation at receipt {receipt_num}: {reason}")]
    IntegrityViolation { receipt_num: i64, reason: String },

    #[error("Malformed signature: {0}")]
    Malformed(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl SignatureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable(_) => ErrorCode::SignatureNotConfigured,
            Self::DeviceDamaged(_) => ErrorCode::SignatureDeviceDamaged,
            Self::Timeout(_) => ErrorCode::SignatureTimeout,
            Self::IntegrityViolation { .. } | Self::Malformed(_) => ErrorCode::ChainMismatch,
            Self::Crypto(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Device or service failure (as opposed to a local integrity problem)
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::DeviceDamaged(_) | Self::Timeout(_))
    }

    pub fn integrity(receipt_num: i64, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            receipt_num,
            reason: reason.into(),
        }
    }
}

/// What gets signed for one receipt
#[derive(Debug, Clone)]
pub struct SignaturePayload {
    pub receipt_num: i64,
    pub timestamp: NaiveDateTime,
    pub payed_by: PayedBy,
    /// Gross sums per tax bracket; zero for reports and null receipts
    pub sums: TaxBracketSums,
}

/// The predecessor a new link is chained to
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousLink {
    /// `None` for the first receipt of the register
    pub receipt_num: Option<i64>,
    pub signature: String,
}

impl PreviousLink {
    /// Chain genesis: the register id stands in for the previous signature
    pub fn genesis(cash_register_id: &str) -> Self {
        Self {
            receipt_num: None,
            signature: cash_register_id.to_string(),
        }
    }

    pub fn from_receipt(receipt: &Receipt) -> Self {
        Self {
            receipt_num: Some(receipt.receipt_num),
            signature: receipt.signature.clone(),
        }
    }
}

/// One link of the signature chain
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureChainLink {
    pub previous_signature_value: String,
    pub current_counter_ciphertext: String,
    pub algorithm_id: String,
    /// Complete signature string stored on the receipt
    pub signature: String,
    /// Signed with the damaged marker instead of a device signature
    pub damaged: bool,
}

/// Signature capability shared by all variants
#[async_trait]
pub trait SignatureModule: Send + Sync {
    async fn sign(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError>;

    /// Whether a real signature device is in use (DEP active)
    fn is_active(&self) -> bool;

    fn is_hardware_damaged(&self) -> bool;

    fn algorithm_id(&self) -> &'static str;
}

/// The configured signature variant
pub enum SignatureUnit {
    Null(NullSignature),
    Standalone(StandaloneSignature),
    Online(OnlineSignature),
}

impl SignatureUnit {
    /// Build the configured variant, falling back to Null when it is unavailable
    pub fn from_config(config: &SignatureConfig, cash_register_id: &str) -> Self {
        match Self::try_from_config(config, cash_register_id) {
            Ok(unit) => {
                tracing::info!(
                    algorithm = unit.algorithm_id(),
                    active = unit.is_active(),
                    "Signature module ready"
                );
                unit
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    code = %e.code(),
                    "Signature module not available, receipts are not signed"
                );
                Self::Null(NullSignature::new(cash_register_id))
            }
        }
    }

    pub fn try_from_config(
        config: &SignatureConfig,
        cash_register_id: &str,
    ) -> Result<Self, SignatureError> {
        let passphrase = || {
            config
                .master_passphrase
                .as_ref()
                .ok_or_else(|| SignatureError::Unavailable("MASTER_PASSPHRASE not set".into()))
        };

        match config.mode {
            SignatureMode::None => Ok(Self::Null(NullSignature::new(cash_register_id))),
            SignatureMode::Standalone => Ok(Self::Standalone(StandaloneSignature::new(
                cash_register_id,
                passphrase()?,
            )?)),
            SignatureMode::Online => {
                let url = config.service_url.as_deref().ok_or_else(|| {
                    SignatureError::Unavailable("SIGNATURE_SERVICE_URL not set".into())
                })?;
                let remote = HttpRemoteSigner::new(url, cash_register_id, config.timeout_ms)?;
                Ok(Self::Online(OnlineSignature::new(
                    cash_register_id,
                    passphrase()?,
                    Arc::new(remote),
                    config.timeout_ms,
                )?))
            }
        }
    }

    /// Sign with the damaged marker instead of a device signature
    ///
    /// The counter is still advanced and the link still chained; only the
    /// signature segment is replaced.
    pub fn sign_damaged(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        match self {
            Self::Online(m) => m.sign_damaged(payload, previous),
            Self::Standalone(m) => m.sign_damaged(payload, previous),
            Self::Null(_) => Err(SignatureError::Unavailable(
                "no signature device configured".into(),
            )),
        }
    }

    /// Recompute every link of `receipts` (chain order)
    pub fn verify_chain(
        &self,
        cash_register_id: &str,
        receipts: &[Receipt],
    ) -> Result<ChainReport, SignatureError> {
        verify_chain(cash_register_id, self.counter_key(), receipts)
    }

    fn counter_key(&self) -> Option<&SecureBytes> {
        match self {
            Self::Null(_) => None,
            Self::Standalone(m) => Some(m.key()),
            Self::Online(m) => Some(m.key()),
        }
    }
}

#[async_trait]
impl SignatureModule for SignatureUnit {
    async fn sign(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        match self {
            Self::Null(m) => m.sign(payload, previous).await,
            Self::Standalone(m) => m.sign(payload, previous).await,
            Self::Online(m) => m.sign(payload, previous).await,
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Self::Null(m) => m.is_active(),
            Self::Standalone(m) => m.is_active(),
            Self::Online(m) => m.is_active(),
        }
    }

    fn is_hardware_damaged(&self) -> bool {
        match self {
            Self::Null(m) => m.is_hardware_damaged(),
            Self::Standalone(m) => m.is_hardware_damaged(),
            Self::Online(m) => m.is_hardware_damaged(),
        }
    }

    fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Null(m) => m.algorithm_id(),
            Self::Standalone(m) => m.algorithm_id(),
            Self::Online(m) => m.algorithm_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SignatureMode, passphrase: Option<&str>) -> SignatureConfig {
        SignatureConfig {
            mode,
            master_passphrase: passphrase.map(|p| SecureBytes::from_slice(p.as_bytes())),
            service_url: None,
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_from_config_selects_variant() {
        let unit = SignatureUnit::from_config(&config(SignatureMode::Standalone, Some("pw")), "K1");
        assert!(matches!(unit, SignatureUnit::Standalone(_)));
        assert!(unit.is_active());

        let unit = SignatureUnit::from_config(&config(SignatureMode::None, None), "K1");
        assert!(matches!(unit, SignatureUnit::Null(_)));
        assert!(!unit.is_active());
    }

    #[test]
    fn test_missing_passphrase_falls_back_to_null() {
        let err = SignatureUnit::try_from_config(&config(SignatureMode::Standalone, None), "K1")
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::SignatureNotConfigured);

        let unit = SignatureUnit::from_config(&config(SignatureMode::Standalone, None), "K1");
        assert!(matches!(unit, SignatureUnit::Null(_)));
    }

    #[test]
    fn test_online_without_url_falls_back_to_null() {
        let unit = SignatureUnit::from_config(&config(SignatureMode::Online, Some("pw")), "K1");
        assert!(matches!(unit, SignatureUnit::Null(_)));
    }

    #[test]
    fn test_error_taxonomy() {
        assert!(SignatureError::DeviceDamaged("x".into()).is_retryable());
        assert!(SignatureError::Timeout(10).is_device_failure());
        let integrity = SignatureError::integrity(3, "bad");
        assert!(!integrity.is_retryable());
        assert!(integrity.code().category().is_fatal());
    }
}
