//! HMAC-SHA256 receipt signatures and chain values

use crate::error::{CryptoError, Result};
use crate::secure::SecureBytes;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sign(key: &SecureBytes, data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key.expose())
        .map_err(|_| CryptoError::InvalidKey("HMAC key rejected".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time verification
pub fn hmac_verify(key: &SecureBytes, data: &[u8], signature: &[u8]) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(key.expose())
        .map_err(|_| CryptoError::InvalidKey("HMAC key rejected".into()))?;
    mac.update(data);
    mac.verify_slice(signature)
        .map_err(|_| CryptoError::Integrity("Signature does not match".into()))
}

/// base64(SHA-256(previous)[0..8])
pub fn chain_value(previous: &str) -> String {
    let digest = Sha256::digest(previous.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = SecureBytes::from_slice(&[7u8; 32]);
        let sig = hmac_sign(&key, b"payload").unwrap();
        assert_eq!(sig.len(), 32);
        hmac_verify(&key, b"payload", &sig).unwrap();
        assert!(hmac_verify(&key, b"payloaD", &sig).is_err());
    }

    #[test]
    fn test_chain_value_is_short_and_stable() {
        let a = chain_value("KASSE-01");
        assert_eq!(a, chain_value("KASSE-01"));
        assert_ne!(a, chain_value("KASSE-02"));
        assert_eq!(a.len(), 12);
    }
}
