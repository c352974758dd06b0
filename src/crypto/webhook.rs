//! HMAC-SHA256 webhook signatures.
//!
//! Signature header format is `sha256=<lowercase hex>` computed over the raw
//! request body with the shared secret as the key.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Scheme prefix carried by the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for `payload`.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, including empty.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a webhook signature in constant time. Never fails; any malformed
/// input yields `false`.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Some(provided) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let expected = sign_payload(payload, secret);
    let Some(expected) = expected.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    // Slices of different length compare unequal.
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
