use super::code::ABSENT;
use super::coder::unsigned_code;
use super::{PreviousLink, SignatureChainLink, SignatureError, SignatureModule, SignaturePayload};
use async_trait::async_trait;

pub const NULL_ALGORITHM: &str = "R1-NONE";

/// 未配置签名设备
///
/// Receipts get a placeholder signature that still carries the chain value,
/// so the receipt order stays checkable.
pub struct NullSignature {
    cash_register_id: String,
}

impl NullSignature {
    pub fn new(cash_register_id: &str) -> Self {
        Self {
            cash_register_id: cash_register_id.to_string(),
        }
    }
}

#[async_trait]
impl SignatureModule for NullSignature {
    async fn sign(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        let (signature, chain_value) =
            unsigned_code(&self.cash_register_id, NULL_ALGORITHM, payload, previous);
        Ok(SignatureChainLink {
            previous_signature_value: chain_value,
            current_counter_ciphertext: ABSENT.to_string(),
            algorithm_id: NULL_ALGORITHM.to_string(),
            signature,
            damaged: false,
        })
    }

    fn is_active(&self) -> bool {
        false
    }

    fn is_hardware_damaged(&self) -> bool {
        false
    }

    fn algorithm_id(&self) -> &'static str {
        NULL_ALGORITHM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignedCode;
    use chrono::NaiveDate;
    use shared::models::{PayedBy, TaxBracketSums};

    #[tokio::test]
    async fn test_null_signature_links_previous() {
        let module = NullSignature::new("KASSE-01");
        let payload = SignaturePayload {
            receipt_num: 1,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            payed_by: PayedBy::Cash,
            sums: TaxBracketSums::default(),
        };
        let first = module
            .sign(&payload, &PreviousLink::genesis("KASSE-01"))
            .await
            .unwrap();
        assert_eq!(
            first.previous_signature_value,
            kassa_crypto::chain_value("KASSE-01")
        );

        let parsed = SignedCode::parse(&first.signature).unwrap();
        assert_eq!(parsed.code.algorithm_id, NULL_ALGORITHM);
        assert!(!parsed.code.has_counter());
        assert!(!module.is_active());
    }
}
