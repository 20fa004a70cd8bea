//! Machine-readable receipt code
//!
//! ```text
//! _R1-<alg>_<register>_<num>_<timestamp>_<payed-by>_<normal>_<reduced1>_<reduced2>_<null>_<special>_<enc-counter>_<key-id>_<chain-value>_<signature>
//! ```
//!
//! `payed-by` is the receipt type code, so a report or null receipt cannot be
//! turned into a sale (or back) without breaking the signature.
//! Counter and chain value are standard base64, the signature is base64-URL.
//! Segments that a variant cannot produce are written as `-`.

use super::SignatureError;
use chrono::NaiveDateTime;
use kassa_crypto::{base32_encode, base64_to_base32, base64url_decode, base64url_encode};
use rust_decimal::Decimal;
use shared::models::{PayedBy, TaxBracket};
use shared::money::{format_code_amount, net_from_gross};
use shared::util::{format_ts, parse_ts};

/// Placeholder for an absent segment
pub const ABSENT: &str = "-";

/// Text carried instead of a signature while the signature device is out of order
pub const SIGNATURE_DAMAGED_MARKER: &str = "Sicherheitseinrichtung ausgefallen";

const SEGMENTS: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptCode {
    pub algorithm_id: String,
    pub cash_register_id: String,
    pub receipt_num: i64,
    pub timestamp: NaiveDateTime,
    pub payed_by: PayedBy,
    /// Gross sums in tax bracket order
    pub sums: [Decimal; 5],
    pub counter: String,
    pub key_id: String,
    pub chain_value: String,
}

impl ReceiptCode {
    pub fn encode(&self) -> String {
        let sums: Vec<String> = self.sums.iter().map(|s| format_code_amount(*s)).collect();
        format!(
            "_{}_{}_{}_{}_{}_{}_{}_{}_{}",
            self.algorithm_id,
            self.cash_register_id,
            self.receipt_num,
            format_ts(&self.timestamp),
            self.payed_by.code(),
            sums.join("_"),
            self.counter,
            self.key_id,
            self.chain_value,
        )
    }

    pub fn has_counter(&self) -> bool {
        self.counter != ABSENT
    }

    pub fn total(&self) -> Decimal {
        self.sums.iter().copied().sum()
    }

    /// Net total of the signed sums
    pub fn net(&self) -> Decimal {
        TaxBracket::ALL
            .iter()
            .zip(self.sums)
            .map(|(bracket, sum)| net_from_gross(sum, bracket.rate()))
            .sum()
    }
}

/// A parsed signature string
#[derive(Debug, Clone, PartialEq)]
pub struct SignedCode {
    pub code: ReceiptCode,
    /// The exact text that was signed
    pub code_text: String,
    /// base64-URL signature, or `-`
    pub signature: String,
}

impl SignedCode {
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let parts: Vec<&str> = text.splitn(SEGMENTS, '_').collect();
        if parts.len() != SEGMENTS || !parts[0].is_empty() || !parts[1].starts_with("R1-") {
            return Err(SignatureError::Malformed(format!(
                "expected {SEGMENTS} segments starting with _R1-"
            )));
        }

        let receipt_num = parts[3]
            .parse::<i64>()
            .map_err(|_| SignatureError::Malformed(format!("receipt number {:?}", parts[3])))?;
        let timestamp = parse_ts(parts[4])
            .ok_or_else(|| SignatureError::Malformed(format!("timestamp {:?}", parts[4])))?;

        let payed_by = parts[5]
            .parse::<i64>()
            .ok()
            .and_then(PayedBy::from_code)
            .ok_or_else(|| SignatureError::Malformed(format!("receipt type {:?}", parts[5])))?;

        let mut sums = [Decimal::ZERO; 5];
        for (slot, text) in sums.iter_mut().zip(&parts[6..11]) {
            *slot = text
                .parse::<Decimal>()
                .map_err(|_| SignatureError::Malformed(format!("amount {text:?}")))?;
        }

        let signature = parts[14].to_string();
        let code_text = text[..text.len() - signature.len() - 1].to_string();

        Ok(Self {
            code: ReceiptCode {
                algorithm_id: parts[1].to_string(),
                cash_register_id: parts[2].to_string(),
                receipt_num,
                timestamp,
                payed_by,
                sums,
                counter: parts[11].to_string(),
                key_id: parts[12].to_string(),
                chain_value: parts[13].to_string(),
            },
            code_text,
            signature,
        })
    }

    pub fn is_damaged(&self) -> bool {
        self.signature == damaged_signature_segment()
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        base64url_decode(&self.signature).map_err(SignatureError::from)
    }
}

/// Join a code with its base64-URL signature segment
pub fn join_signature(code_text: &str, signature_segment: &str) -> String {
    format!("{code_text}_{signature_segment}")
}

pub fn damaged_signature_segment() -> String {
    base64url_encode(SIGNATURE_DAMAGED_MARKER.as_bytes())
}

/// OCR representation: binary segments re-encoded as base32
pub fn ocr_code(signature: &str) -> Result<String, SignatureError> {
    let signed = SignedCode::parse(signature)?;
    let mut code = signed.code.clone();
    if code.has_counter() {
        code.counter = base64_to_base32(&code.counter)?;
    }
    code.chain_value = base64_to_base32(&code.chain_value)?;

    let signature_segment = if signed.signature == ABSENT {
        ABSENT.to_string()
    } else {
        base32_encode(&signed.signature_bytes()?)
    };
    Ok(join_signature(&code.encode(), &signature_segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn sample() -> ReceiptCode {
        ReceiptCode {
            algorithm_id: "R1-HS256".into(),
            cash_register_id: "KASSE-01".into(),
            receipt_num: 42,
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 3)
                .unwrap()
                .and_hms_opt(10, 15, 0)
                .unwrap(),
            payed_by: PayedBy::Cash,
            sums: [
                Decimal::from_str("12.00").unwrap(),
                Decimal::from_str("-3.5").unwrap(),
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO,
            ],
            counter: "q83vEjRWeJA=".into(),
            key_id: "0a1b2c3d".into(),
            chain_value: "AAECAwQFBgc=".into(),
        }
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(
            sample().encode(),
            "_R1-HS256_KASSE-01_42_2024-05-03T10:15:00_0_12.00_-3.50_0.00_0.00_0.00_q83vEjRWeJA=_0a1b2c3d_AAECAwQFBgc="
        );
    }

    #[test]
    fn test_parse_with_underscore_in_signature() {
        let code = sample();
        let text = join_signature(&code.encode(), "ab_c-d");
        let parsed = SignedCode::parse(&text).unwrap();
        assert_eq!(parsed.signature, "ab_c-d");
        assert_eq!(parsed.code_text, code.encode());
        assert_eq!(parsed.code.receipt_num, 42);
        assert_eq!(parsed.code.total(), Decimal::from_str("8.50").unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SignedCode::parse("KASSE-01").is_err());
        assert!(SignedCode::parse("_X1_a_b_c_d_e_f_g_h_i_j_k_l_m").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_receipt_type() {
        let text = join_signature(&sample().encode(), "sig").replacen("T10:15:00_0_", "T10:15:00_99_", 1);
        assert!(matches!(SignedCode::parse(&text), Err(SignatureError::Malformed(_))));
    }

    #[test]
    fn test_receipt_type_is_part_of_signed_text() {
        let mut report = sample();
        report.payed_by = PayedBy::ReportEod;
        let parsed = SignedCode::parse(&join_signature(&report.encode(), "sig")).unwrap();
        assert_eq!(parsed.code.payed_by, PayedBy::ReportEod);
        assert_ne!(parsed.code_text, sample().encode());
    }

    #[test]
    fn test_damaged_marker_detected() {
        let text = join_signature(&sample().encode(), &damaged_signature_segment());
        assert!(SignedCode::parse(&text).unwrap().is_damaged());
    }

    #[test]
    fn test_ocr_code_uses_base32() {
        let text = join_signature(&sample().encode(), &base64url_encode(&[0xff, 0xfe]));
        let ocr = ocr_code(&text).unwrap();
        assert!(ocr.ends_with("_AAAQEAYEAUDAO===_777A===="));
        assert!(ocr.contains("_VPG66ERUKZ4JA===_"));
    }
}
