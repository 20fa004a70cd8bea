//! Turnover counter cipher
//!
//! AES-256-GCM over the 8 byte big-endian counter. The nonce is derived from
//! the receipt context and the context is authenticated as associated data,
//! so each ciphertext is bound to exactly one `(register, receipt number)`.
//!
//! Format: base64(ciphertext_8bytes || tag_16bytes)

use crate::error::{CryptoError, Result};
use crate::kdf::KEY_LEN;
use crate::secure::SecureBytes;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Canonical context string of a receipt's counter
pub fn counter_context(cash_register_id: &str, receipt_num: i64) -> String {
    format!("{cash_register_id}:{receipt_num}")
}

fn cipher_from_hex(key_hex: &str) -> Result<Aes256Gcm> {
    let key = SecureBytes::from_hex(key_hex)?;
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "Key length {} (expected {KEY_LEN})",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key.expose())
        .map_err(|_| CryptoError::InvalidKey("Key rejected by cipher".into()))
}

fn nonce_for(context: &str) -> [u8; NONCE_LEN] {
    let digest = Sha256::digest(context.as_bytes());
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest[..NONCE_LEN]);
    nonce
}

/// Encrypt a counter value for `context`
pub fn encrypt_counter(context: &str, value: i64, key_hex: &str) -> Result<String> {
    let cipher = cipher_from_hex(key_hex)?;
    let nonce_bytes = nonce_for(context);
    let plaintext = value.to_be_bytes();

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: context.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&ciphertext))
}

/// Decrypt a counter value that was encrypted for `context`
pub fn decrypt_counter(context: &str, ciphertext: &str, key_hex: &str) -> Result<i64> {
    let cipher = cipher_from_hex(key_hex)?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| CryptoError::Integrity(format!("Counter is not valid base64: {e}")))?;
    if data.len() != 8 + TAG_LEN {
        return Err(CryptoError::Integrity(format!(
            "Counter ciphertext has {} bytes",
            data.len()
        )));
    }

    let nonce_bytes = nonce_for(context);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &data,
                aad: context.as_bytes(),
            },
        )
        .map_err(|_| {
            CryptoError::Integrity(format!(
                "Counter for {context} failed authentication (wrong key or tampered data)"
            ))
        })?;

    let bytes: [u8; 8] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Integrity("Counter plaintext has wrong length".into()))?;
    Ok(i64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::make_key_and_iv;

    fn key_hex() -> String {
        make_key_and_iv(b"unit-test").unwrap().0.to_hex()
    }

    #[test]
    fn test_round_trip() {
        let key = key_hex();
        let ctx = counter_context("KASSE-01", 1);
        for value in [0, 1, -1, -12345, 34567, i64::MAX / 2, i64::MIN, i64::MAX] {
            let enc = encrypt_counter(&ctx, value, &key).unwrap();
            assert_eq!(decrypt_counter(&ctx, &enc, &key).unwrap(), value);
        }
    }

    #[test]
    fn test_context_separation() {
        let key = key_hex();
        let a = encrypt_counter(&counter_context("KASSE-01", 1), 100, &key).unwrap();
        let b = encrypt_counter(&counter_context("KASSE-01", 2), 100, &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sign_separation() {
        let key = key_hex();
        let ctx = counter_context("KASSE-01", 5);
        let plus = encrypt_counter(&ctx, 1, &key).unwrap();
        let minus = encrypt_counter(&ctx, -1, &key).unwrap();
        assert_ne!(plus, minus);
    }

    #[test]
    fn test_wrong_context_fails() {
        let key = key_hex();
        let enc = encrypt_counter(&counter_context("KASSE-01", 1), 42, &key).unwrap();
        let err = decrypt_counter(&counter_context("KASSE-01", 2), &enc, &key).unwrap_err();
        assert!(matches!(err, CryptoError::Integrity(_)));
    }

    #[test]
    fn test_corrupted_text_fails() {
        let key = key_hex();
        let ctx = counter_context("KASSE-01", 1);
        assert!(matches!(
            decrypt_counter(&ctx, "not base64!!", &key),
            Err(CryptoError::Integrity(_))
        ));
        assert!(matches!(
            decrypt_counter(&ctx, "AAAA", &key),
            Err(CryptoError::Integrity(_))
        ));
    }

    #[test]
    fn test_invalid_key() {
        let ctx = counter_context("KASSE-01", 1);
        assert!(matches!(
            encrypt_counter(&ctx, 1, "abc"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            encrypt_counter(&ctx, 1, "00ff"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
