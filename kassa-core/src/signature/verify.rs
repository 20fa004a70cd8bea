//! Chain verification

use super::code::SignedCode;
use super::standalone::STANDALONE_ALGORITHM;
use super::SignatureError;
use kassa_crypto::{SecureBytes, chain_value, counter_context, decrypt_counter, hmac_verify};
use shared::models::Receipt;
use shared::money::{round2, to_cents};
use zeroize::Zeroizing;

/// Result of a successful chain verification
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChainReport {
    pub verified: usize,
    /// Receipts whose counter was decrypted and checked
    pub counter_checked: usize,
    /// Receipts without counter (no signature device)
    pub unsigned: usize,
    /// Receipts carrying the damaged marker
    pub damaged: usize,
}

/// Recompute every link of `receipts`, which must be in chain order
///
/// Without a key only chain values, numbers, types, timestamps and sums are checked.
pub fn verify_chain(
    cash_register_id: &str,
    key: Option<&SecureBytes>,
    receipts: &[Receipt],
) -> Result<ChainReport, SignatureError> {
    let key_hex = key.map(|k| Zeroizing::new(k.to_hex()));
    let mut report = ChainReport::default();
    let mut previous_signature = cash_register_id.to_string();
    let mut previous_counter = 0i64;
    let mut previous_timestamp = None;

    for receipt in receipts {
        let num = receipt.receipt_num;
        let fail = |reason: String| SignatureError::integrity(num, reason);

        let signed = SignedCode::parse(&receipt.signature).map_err(|e| fail(e.to_string()))?;
        let code = &signed.code;

        if code.receipt_num != num {
            return Err(fail(format!("signature names receipt {}", code.receipt_num)));
        }
        if code.cash_register_id != cash_register_id {
            return Err(fail(format!("signature names register {}", code.cash_register_id)));
        }
        if code.timestamp != receipt.timestamp {
            return Err(fail("timestamp differs from signed timestamp".into()));
        }
        if previous_timestamp.is_some_and(|prev| receipt.timestamp < prev) {
            return Err(fail("timestamp precedes the previous receipt".into()));
        }
        if code.payed_by != receipt.payed_by {
            return Err(fail(format!(
                "receipt type {} differs from signed type {}",
                receipt.payed_by, code.payed_by
            )));
        }
        if round2(code.total()) != round2(receipt.gross) {
            return Err(fail(format!(
                "gross {} differs from signed sums {}",
                receipt.gross,
                code.total()
            )));
        }
        if round2(code.net()) != round2(receipt.net) {
            return Err(fail(format!(
                "net {} differs from signed sums {}",
                receipt.net,
                code.net()
            )));
        }
        if code.chain_value != chain_value(&previous_signature) {
            return Err(fail("chain value does not match the predecessor".into()));
        }

        if code.has_counter() {
            if let Some(key_hex) = &key_hex {
                let context = counter_context(&code.cash_register_id, num);
                let value = decrypt_counter(&context, &code.counter, key_hex)
                    .map_err(|e| fail(format!("counter: {e}")))?;
                let delta = to_cents(code.total())
                    .ok_or_else(|| fail("turnover does not fit the counter".into()))?;
                let expected = previous_counter.checked_add(delta);
                if expected != Some(value) {
                    return Err(fail(format!(
                        "counter {value} does not continue {previous_counter}"
                    )));
                }
                previous_counter = value;
                report.counter_checked += 1;
            }
        } else {
            previous_counter = 0;
            report.unsigned += 1;
        }

        if signed.is_damaged() {
            report.damaged += 1;
        } else if code.algorithm_id == STANDALONE_ALGORITHM
            && let Some(key) = key
        {
            let signature = signed.signature_bytes().map_err(|e| fail(e.to_string()))?;
            hmac_verify(key, signed.code_text.as_bytes(), &signature)
                .map_err(|_| fail("signature does not match the code".into()))?;
        }

        report.verified += 1;
        previous_signature.clone_from(&receipt.signature);
        previous_timestamp = Some(receipt.timestamp);
    }

    tracing::debug!(
        verified = report.verified,
        damaged = report.damaged,
        "Signature chain verified"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{NullSignature, PreviousLink, SignatureModule, SignaturePayload};
    use rust_decimal::Decimal;
    use shared::models::{PayedBy, StornoState, TaxBracket, TaxBracketSums};
    use shared::util::parse_ts;

    const REG: &str = "KASSE-01";

    /// Unsigned chain of 12.00 sales at the given times
    async fn chain(times: &[&str]) -> Vec<Receipt> {
        let module = NullSignature::new(REG);
        let mut previous = PreviousLink::genesis(REG);
        let mut receipts = Vec::new();
        for (i, at) in times.iter().enumerate() {
            let mut sums = TaxBracketSums::default();
            sums.add(TaxBracket::Normal, Decimal::new(1200, 2));
            let payload = SignaturePayload {
                receipt_num: i as i64 + 1,
                timestamp: parse_ts(at).unwrap(),
                payed_by: PayedBy::Cash,
                sums,
            };
            let link = module.sign(&payload, &previous).await.unwrap();
            let receipt = Receipt {
                id: payload.receipt_num,
                receipt_num: payload.receipt_num,
                timestamp: payload.timestamp,
                payed_by: PayedBy::Cash,
                gross: sums.total(),
                net: sums.net(),
                storno: StornoState::None,
                storno_id: 0,
                user_id: None,
                signature: link.signature,
            };
            previous = PreviousLink::from_receipt(&receipt);
            receipts.push(receipt);
        }
        receipts
    }

    fn violation_at(result: Result<ChainReport, SignatureError>) -> i64 {
        match result {
            Err(SignatureError::IntegrityViolation { receipt_num, .. }) => receipt_num,
            other => panic!("expected integrity violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsigned_chain_verifies() {
        let receipts = chain(&[
            "2024-03-09T10:00:00",
            "2024-03-09T10:00:00",
            "2024-03-09T11:00:00",
        ])
        .await;
        let report = verify_chain(REG, None, &receipts).unwrap();
        assert_eq!(report.verified, 3);
        assert_eq!(report.unsigned, 3);
        assert_eq!(receipts[0].net, Decimal::new(1000, 2));
    }

    #[tokio::test]
    async fn test_timestamps_must_not_go_backwards() {
        let receipts = chain(&["2024-03-09T10:00:00", "2024-03-08T12:00:00"]).await;
        assert_eq!(violation_at(verify_chain(REG, None, &receipts)), 2);
    }

    #[tokio::test]
    async fn test_receipt_type_and_net_are_signed() {
        let mut receipts = chain(&["2024-03-09T10:00:00", "2024-03-09T11:00:00"]).await;
        receipts[1].payed_by = PayedBy::ReportEod;
        assert_eq!(violation_at(verify_chain(REG, None, &receipts)), 2);

        let mut receipts = chain(&["2024-03-09T10:00:00", "2024-03-09T11:00:00"]).await;
        receipts[0].net = Decimal::ZERO;
        assert_eq!(violation_at(verify_chain(REG, None, &receipts)), 1);
    }
}
