//! Online signature: the code is signed by an external signing service

use super::coder::ReceiptCoder;
use super::{PreviousLink, SignatureChainLink, SignatureError, SignatureModule, SignaturePayload};
use async_trait::async_trait;
use kassa_crypto::{SecureBytes, base64url_decode, base64url_encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub const ONLINE_ALGORITHM: &str = "R1-ES256";

/// Seam to the remote signing device
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Raw signature over `data`
    async fn sign(&self, data: &str) -> Result<Vec<u8>, SignatureError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    cash_register_id: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    /// base64-URL
    signature: String,
}

/// HTTP signing service client
///
/// `POST {base_url}/sign` with `{"cashRegisterId", "data"}`, answer
/// `{"signature": "<base64url>"}`.
pub struct HttpRemoteSigner {
    client: reqwest::Client,
    endpoint: String,
    cash_register_id: String,
}

impl HttpRemoteSigner {
    pub fn new(base_url: &str, cash_register_id: &str, timeout_ms: u64) -> Result<Self, SignatureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SignatureError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/sign", base_url.trim_end_matches('/')),
            cash_register_id: cash_register_id.to_string(),
        })
    }
}

#[async_trait]
impl RemoteSigner for HttpRemoteSigner {
    async fn sign(&self, data: &str) -> Result<Vec<u8>, SignatureError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SignRequest {
                cash_register_id: &self.cash_register_id,
                data,
            })
            .send()
            .await
            .map_err(|e| SignatureError::DeviceDamaged(format!("signing service: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignatureError::DeviceDamaged(format!(
                "signing service answered {status}"
            )));
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| SignatureError::DeviceDamaged(format!("signing service answer: {e}")))?;
        base64url_decode(&body.signature)
            .map_err(|e| SignatureError::DeviceDamaged(format!("signing service answer: {e}")))
    }
}

pub struct OnlineSignature {
    coder: ReceiptCoder,
    remote: Arc<dyn RemoteSigner>,
    timeout: Duration,
    damaged: AtomicBool,
}

impl OnlineSignature {
    pub fn new(
        cash_register_id: &str,
        passphrase: &SecureBytes,
        remote: Arc<dyn RemoteSigner>,
        timeout_ms: u64,
    ) -> Result<Self, SignatureError> {
        Ok(Self {
            coder: ReceiptCoder::new(cash_register_id, ONLINE_ALGORITHM, passphrase)?,
            remote,
            timeout: Duration::from_millis(timeout_ms),
            damaged: AtomicBool::new(false),
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

    fn mark_damaged(&self, error: &SignatureError, receipt_num: i64) {
        self.damaged.store(true, Ordering::SeqCst);
        tracing::error!(
            receipt_num = receipt_num,
            error = %error,
            "Signature service failed, device marked damaged"
        );
    }
}

#[async_trait]
impl SignatureModule for OnlineSignature {
    async fn sign(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        let prepared = self.coder.prepare(payload, previous)?;

        let result = tokio::time::timeout(self.timeout, self.remote.sign(&prepared.code_text)).await;
        let signature = match result {
            Ok(Ok(signature)) => signature,
            Ok(Err(e)) => {
                let e = if e.is_device_failure() {
                    e
                } else {
                    SignatureError::DeviceDamaged(e.to_string())
                };
                self.mark_damaged(&e, payload.receipt_num);
                return Err(e);
            }
            Err(_) => {
                let e = SignatureError::Timeout(self.timeout.as_millis() as u64);
                self.mark_damaged(&e, payload.receipt_num);
                return Err(e);
            }
        };

        if self.damaged.swap(false, Ordering::SeqCst) {
            tracing::info!(receipt_num = payload.receipt_num, "Signature service recovered");
        }

        Ok(self
            .coder
            .finish(prepared, &base64url_encode(&signature), false))
    }

    fn is_active(&self) -> bool {
        true
    }

    fn is_hardware_damaged(&self) -> bool {
        self.damaged.load(Ordering::SeqCst)
    }

    fn algorithm_id(&self) -> &'static str {
        self.coder.algorithm_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::models::{PayedBy, TaxBracketSums};

    struct SwitchSigner {
        fail: AtomicBool,
        slow: AtomicBool,
    }

    #[async_trait]
    impl RemoteSigner for SwitchSigner {
        async fn sign(&self, data: &str) -> Result<Vec<u8>, SignatureError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SignatureError::DeviceDamaged("offline".into()));
            }
            Ok(data.as_bytes()[..4].to_vec())
        }
    }

    fn payload() -> SignaturePayload {
        SignaturePayload {
            receipt_num: 1,
            timestamp: NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            payed_by: PayedBy::Cash,
            sums: TaxBracketSums::default(),
        }
    }

    fn module(signer: Arc<SwitchSigner>) -> OnlineSignature {
        OnlineSignature::new("KASSE-01", &SecureBytes::from_slice(b"online"), signer, 50).unwrap()
    }

    #[tokio::test]
    async fn test_failure_sets_and_success_clears_damage() {
        let signer = Arc::new(SwitchSigner {
            fail: AtomicBool::new(true),
            slow: AtomicBool::new(false),
        });
        let module = module(signer.clone());
        let genesis = PreviousLink::genesis("KASSE-01");

        let err = module.sign(&payload(), &genesis).await.unwrap_err();
        assert!(matches!(err, SignatureError::DeviceDamaged(_)));
        assert!(module.is_hardware_damaged());

        signer.fail.store(false, Ordering::SeqCst);
        let link = module.sign(&payload(), &genesis).await.unwrap();
        assert!(!link.damaged);
        assert!(!module.is_hardware_damaged());
    }

    #[tokio::test]
    async fn test_timeout_is_device_failure() {
        let signer = Arc::new(SwitchSigner {
            fail: AtomicBool::new(false),
            slow: AtomicBool::new(true),
        });
        let module = module(signer);
        let err = module
            .sign(&payload(), &PreviousLink::genesis("KASSE-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignatureError::Timeout(50)));
        assert!(module.is_hardware_damaged());
    }

    #[test]
    fn test_damaged_link_keeps_counter() {
        let module = module(Arc::new(SwitchSigner {
            fail: AtomicBool::new(true),
            slow: AtomicBool::new(false),
        }));
        let link = module
            .sign_damaged(&payload(), &PreviousLink::genesis("KASSE-01"))
            .unwrap();
        assert!(link.damaged);
        assert_ne!(link.current_counter_ciphertext, "-");
    }
}
