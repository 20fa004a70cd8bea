use super::coder::ReceiptCoder;
use super::{PreviousLink, SignatureChainLink, SignatureError, SignatureModule, SignaturePayload};
use async_trait::async_trait;
use kassa_crypto::{SecureBytes, base64url_encode, hmac_sign};

pub const STANDALONE_ALGORITHM: &str = "R1-HS256";

/// Local signing with HMAC-SHA256 under the derived key
pub struct StandaloneSignature {
    coder: ReceiptCoder,
}

impl StandaloneSignature {
    pub fn new(cash_register_id: &str, passphrase: &SecureBytes) -> Result<Self, SignatureError> {
        Ok(Self {
            coder: ReceiptCoder::new(cash_register_id, STANDALONE_ALGORITHM, passphrase)?,
        })
    }

    pub(crate) fn key(&self) -> &SecureBytes {
        self.coder.key()
    }

    pub(crate) fn sign_damaged(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        self.coder.sign_damaged(payload, previous)
    }
}

#[async_trait]
impl SignatureModule for StandaloneSignature {
    async fn sign(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        let prepared = self.coder.prepare(payload, previous)?;
        let signature = hmac_sign(self.coder.key(), prepared.code_text.as_bytes())?;
        Ok(self
            .coder
            .finish(prepared, &base64url_encode(&signature), false))
    }

    fn is_active(&self) -> bool {
        true
    }

    fn is_hardware_damaged(&self) -> bool {
        false
    }

    fn algorithm_id(&self) -> &'static str {
        self.coder.algorithm_id()
    }
}
