//! Text encodings for the QR and OCR representation
//!
//! base32 follows RFC 4648 with padding, base64-URL has no padding.

use crate::error::{CryptoError, Result};
use base64::Engine;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);

    for chunk in data.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = buf.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        // 有效字符数: 1->2, 2->4, 3->5, 4->7, 5->8
        let significant = (chunk.len() * 8).div_ceil(5);
        for i in 0..8 {
            if i < significant {
                let index = ((bits >> (35 - i * 5)) & 0x1f) as usize;
                out.push(BASE32_ALPHABET[index] as char);
            } else {
                out.push('=');
            }
        }
    }

    out
}

pub fn base32_decode(text: &str) -> Result<Vec<u8>> {
    let text = text.trim();
    if text.len() % 8 != 0 {
        return Err(CryptoError::InvalidInput(format!(
            "base32 length {} is not a multiple of 8",
            text.len()
        )));
    }

    let mut out = Vec::with_capacity(text.len() / 8 * 5);
    let blocks = text.as_bytes().chunks(8);
    let block_count = blocks.len();

    for (block_index, block) in blocks.enumerate() {
        let significant = block.iter().take_while(|c| **c != b'=').count();
        if block[significant..].iter().any(|c| *c != b'=') {
            return Err(CryptoError::InvalidInput("base32 padding in the middle".into()));
        }
        if significant < 8 && block_index + 1 != block_count {
            return Err(CryptoError::InvalidInput("base32 padding before the end".into()));
        }
        let byte_count = match significant {
            8 => 5,
            7 => 4,
            5 => 3,
            4 => 2,
            2 => 1,
            other => {
                return Err(CryptoError::InvalidInput(format!(
                    "base32 block with {other} significant characters"
                )));
            }
        };

        let mut bits = 0u64;
        for c in &block[..significant] {
            let value = BASE32_ALPHABET
                .iter()
                .position(|a| a == c)
                .ok_or_else(|| {
                    CryptoError::InvalidInput(format!("Invalid base32 character {:?}", *c as char))
                })?;
            bits = (bits << 5) | value as u64;
        }
        bits <<= 5 * (8 - significant);

        let bytes = bits.to_be_bytes();
        out.extend_from_slice(&bytes[3..3 + byte_count]);
    }

    Ok(out)
}

pub fn base64url_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

pub fn base64url_decode(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(text.trim())
        .map_err(|e| CryptoError::InvalidInput(format!("Invalid base64url: {e}")))
}

/// Standard base64 to base32, used when rendering OCR codes
pub fn base64_to_base32(text: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| CryptoError::InvalidInput(format!("Invalid base64: {e}")))?;
    Ok(base32_encode(&bytes))
}
