//! Cryptographic primitives of the fiscal core
//!
//! Key derivation, the turnover counter cipher, HMAC receipt signatures and the
//! text encodings used for QR / OCR codes.

mod counter;
mod encoding;
mod error;
mod kdf;
mod mac;
mod secure;

pub use counter::{counter_context, decrypt_counter, encrypt_counter};
pub use encoding::{
    base32_decode, base32_encode, base64_to_base32, base64url_decode, base64url_encode,
};
pub use error::{CryptoError, Result};
pub use kdf::{IV_LEN, KEY_LEN, key_id, make_key_and_iv};
pub use mac::{chain_value, hmac_sign, hmac_verify};
pub use secure::SecureBytes;
