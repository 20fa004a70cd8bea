//! 敏感字节容器 (Secure value container)
//!
//! Holds derived keys and IVs. The bytes are wiped on drop and never show up
//! in `Debug` output or serialized state.

use crate::error::{CryptoError, Result};
use std::fmt;
use zeroize::Zeroize;

pub struct SecureBytes {
    bytes: Vec<u8>,
}

impl Drop for SecureBytes {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl SecureBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// 从十六进制解析
    pub fn from_hex(text: &str) -> Result<Self> {
        hex::decode(text.trim())
            .map(Self::new)
            .map_err(|e| CryptoError::InvalidKey(format!("Malformed hex: {e}")))
    }

    /// Borrow the raw bytes. Callers must not keep copies around.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Explicit hex export, used to hand the key to the counter cipher
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl Clone for SecureBytes {
    fn clone(&self) -> Self {
        Self::from_slice(&self.bytes)
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SecureBytes {}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {} bytes])", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecureBytes::from_slice(b"top secret");
        let printed = format!("{secret:?}");
        assert_eq!(printed, "SecureBytes([REDACTED; 10 bytes])");
        assert!(!printed.contains("top"));
    }

    #[test]
    fn test_hex_round_trip() {
        let secret = SecureBytes::from_slice(&[0x00, 0xab, 0xff]);
        assert_eq!(secret.to_hex(), "00abff");
        assert_eq!(SecureBytes::from_hex("00abff").unwrap(), secret);
        assert!(matches!(
            SecureBytes::from_hex("zz"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_empty() {
        let empty = SecureBytes::new(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }
}
