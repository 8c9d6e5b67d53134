//! Policy signatures
//!
//! The policy is signed as `base64(HMAC-SHA1(secret, policy_base64))`, the
//! same construction as the legacy S3 SigV2 scheme.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// HMAC-SHA1 signer for policy documents
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureEngine;

impl SignatureEngine {
    /// Sign `message` with `secret_key`
    pub fn sign(message: &str, secret_key: &str) -> String {
        let mut mac =
            HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Check a signature produced by [`Self::sign`]
    pub fn verify(message: &str, secret_key: &str, signature: &str) -> bool {
        let calculated = Self::sign(message, secret_key);
        constant_time_eq(&calculated, signature)
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
