//! SHA-256 helpers for log-safe license key handling.

use sha2::{Digest, Sha256};

/// Number of hex characters kept in a key fingerprint.
pub const FINGERPRINT_LEN: usize = 12;

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Short, stable fingerprint of a license key.
///
/// Raw keys are never logged; this is what goes into `key_fingerprint`
/// fields instead.
pub fn key_fingerprint(key: &str) -> String {
    let mut digest = sha256_hex(key.as_bytes());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_is_prefix_of_digest() {
        let key = "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";
        let fp = key_fingerprint(key);
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(sha256_hex(key.as_bytes()).starts_with(&fp));
    }

    #[test]
    fn test_fingerprint_does_not_contain_key() {
        let key = "AAAAAAAAAAAA";
        assert!(!key_fingerprint(key).contains(key));
    }

    #[test]
    fn test_fingerprint_differs_per_key() {
        assert_ne!(key_fingerprint("KEY1"), key_fingerprint("KEY2"));
    }
}
