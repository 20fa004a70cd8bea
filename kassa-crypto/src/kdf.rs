//! Key derivation from the master passphrase
//!
//! PBKDF2-HMAC-SHA256 with a fixed application salt. 48 output bytes are split
//! into the AES-256 key and a 16 byte IV.

use crate::error::{CryptoError, Result};
use crate::secure::SecureBytes;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

const KDF_SALT: &[u8] = b"kassa-fiscal-core/counter-key/v1";
const KDF_ITERATIONS: u32 = 10_000;

/// Derive `(key, iv)` from a passphrase. Deterministic.
pub fn make_key_and_iv(passphrase: &[u8]) -> Result<(SecureBytes, SecureBytes)> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("Empty passphrase".into()));
    }

    let mut out = [0u8; KEY_LEN + IV_LEN];
    pbkdf2_hmac::<Sha256>(passphrase, KDF_SALT, KDF_ITERATIONS, &mut out);

    let key = SecureBytes::from_slice(&out[..KEY_LEN]);
    let iv = SecureBytes::from_slice(&out[KEY_LEN..]);
    out.zeroize();

    Ok((key, iv))
}

/// Short public identifier of a key (first 8 hex chars of its SHA-256)
pub fn key_id(key: &SecureBytes) -> String {
    use sha2::Digest;
    let digest = Sha256::digest(key.expose());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        let (key, iv) = make_key_and_iv(b"Kassa!").unwrap();
        assert_eq!(key.len(), KEY_LEN);
        assert_eq!(iv.len(), IV_LEN);
    }

    #[test]
    fn test_deterministic() {
        let (k1, iv1) = make_key_and_iv(b"passphrase").unwrap();
        let (k2, iv2) = make_key_and_iv(b"passphrase").unwrap();
        assert_eq!(k1, k2);
        assert_eq!(iv1, iv2);
    }

    #[test]
    fn test_different_passphrases_differ() {
        let (k1, _) = make_key_and_iv(b"alpha").unwrap();
        let (k2, _) = make_key_and_iv(b"alphb").unwrap();
        assert_ne!(k1, k2);
        assert_ne!(key_id(&k1), key_id(&k2));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(matches!(
            make_key_and_iv(b""),
            Err(CryptoError::InvalidInput(_))
        ));
    }
}
