//! Counter and code handling shared by the signing variants

use super::code::{ABSENT, ReceiptCode, SignedCode, damaged_signature_segment, join_signature};
use super::{PreviousLink, SignatureChainLink, SignatureError, SignaturePayload};
use kassa_crypto::{
    SecureBytes, chain_value, counter_context, decrypt_counter, encrypt_counter, key_id,
    make_key_and_iv,
};
use shared::money::to_cents;
use zeroize::Zeroize;

/// A code ready to be signed
pub(crate) struct PreparedCode {
    pub code_text: String,
    pub chain_value: String,
    pub counter: String,
}

pub(crate) struct ReceiptCoder {
    cash_register_id: String,
    algorithm_id: &'static str,
    key: SecureBytes,
    key_id: String,
}

impl ReceiptCoder {
    pub fn new(
        cash_register_id: &str,
        algorithm_id: &'static str,
        passphrase: &SecureBytes,
    ) -> Result<Self, SignatureError> {
        let (key, _iv) = make_key_and_iv(passphrase.expose())?;
        let key_id = key_id(&key);
        Ok(Self {
            cash_register_id: cash_register_id.to_string(),
            algorithm_id,
            key,
            key_id,
        })
    }

    pub fn key(&self) -> &SecureBytes {
        &self.key
    }

    pub fn algorithm_id(&self) -> &'static str {
        self.algorithm_id
    }

    fn with_key_hex<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let mut hex = self.key.to_hex();
        let result = f(&hex);
        hex.zeroize();
        result
    }

    /// Decrypt the counter carried by the previous link
    fn previous_counter(&self, previous: &PreviousLink) -> Result<i64, SignatureError> {
        let Some(prev_num) = previous.receipt_num else {
            return Ok(0);
        };

        let signed = SignedCode::parse(&previous.signature)
            .map_err(|e| SignatureError::integrity(prev_num, e.to_string()))?;
        if signed.code.receipt_num != prev_num {
            return Err(SignatureError::integrity(
                prev_num,
                format!("signature names receipt {}", signed.code.receipt_num),
            ));
        }
        if !signed.code.has_counter() {
            tracing::warn!(
                previous_receipt = prev_num,
                "Previous receipt carries no counter, counter starts at zero"
            );
            return Ok(0);
        }

        let context = counter_context(&signed.code.cash_register_id, prev_num);
        self.with_key_hex(|key_hex| decrypt_counter(&context, &signed.code.counter, key_hex))
            .map_err(|e| SignatureError::integrity(prev_num, format!("counter: {e}")))
    }

    pub fn prepare(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<PreparedCode, SignatureError> {
        let chain_value = chain_value(&previous.signature);

        let delta = to_cents(payload.sums.total()).ok_or_else(|| {
            SignatureError::integrity(payload.receipt_num, "turnover does not fit the counter")
        })?;
        let counter_value = self
            .previous_counter(previous)?
            .checked_add(delta)
            .ok_or_else(|| SignatureError::integrity(payload.receipt_num, "counter overflow"))?;

        let context = counter_context(&self.cash_register_id, payload.receipt_num);
        let counter =
            self.with_key_hex(|key_hex| encrypt_counter(&context, counter_value, key_hex))?;

        let code = ReceiptCode {
            algorithm_id: self.algorithm_id.to_string(),
            cash_register_id: self.cash_register_id.clone(),
            receipt_num: payload.receipt_num,
            timestamp: payload.timestamp,
            payed_by: payload.payed_by,
            sums: payload.sums.as_array(),
            counter: counter.clone(),
            key_id: self.key_id.clone(),
            chain_value: chain_value.clone(),
        };

        Ok(PreparedCode {
            code_text: code.encode(),
            chain_value,
            counter,
        })
    }

    pub fn finish(&self, prepared: PreparedCode, signature_segment: &str, damaged: bool) -> SignatureChainLink {
        SignatureChainLink {
            signature: join_signature(&prepared.code_text, signature_segment),
            previous_signature_value: prepared.chain_value,
            current_counter_ciphertext: prepared.counter,
            algorithm_id: self.algorithm_id.to_string(),
            damaged,
        }
    }

    pub fn sign_damaged(
        &self,
        payload: &SignaturePayload,
        previous: &PreviousLink,
    ) -> Result<SignatureChainLink, SignatureError> {
        let prepared = self.prepare(payload, previous)?;
        Ok(self.finish(prepared, &damaged_signature_segment(), true))
    }
}

/// Code of a receipt that carries neither counter nor signature
pub(crate) fn unsigned_code(
    cash_register_id: &str,
    algorithm_id: &str,
    payload: &SignaturePayload,
    previous: &PreviousLink,
) -> (String, String) {
    let chain_value = chain_value(&previous.signature);
    let code = ReceiptCode {
        algorithm_id: algorithm_id.to_string(),
        cash_register_id: cash_register_id.to_string(),
        receipt_num: payload.receipt_num,
        timestamp: payload.timestamp,
        payed_by: payload.payed_by,
        sums: payload.sums.as_array(),
        counter: ABSENT.to_string(),
        key_id: ABSENT.to_string(),
        chain_value: chain_value.clone(),
    };
    (join_signature(&code.encode(), ABSENT), chain_value)
}
