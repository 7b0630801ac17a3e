//! Webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::b64::b64_decode;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(secret: &[u8], body: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Compute HMAC-SHA256 over `body` and return it hex-encoded.
pub fn hmac_sha256_hex(secret: &[u8], body: &[u8]) -> String {
    hmac_sha256(secret, body)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Verify a webhook signature against the raw request body. Providers send
/// either hex or base64; both are accepted. Comparison is constant-time
/// regardless of where a mismatch occurs.
pub fn verify_hmac_sha256(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let expected = hmac_sha256(secret, body);
    let signature = signature.trim();

    let hex: String = expected.iter().map(|b| format!("{:02x}", b)).collect();
    if constant_time_eq(hex.as_bytes(), signature.as_bytes()) {
        return true;
    }

    match b64_decode(signature) {
        Ok(decoded) => constant_time_eq(&expected, &decoded),
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::b64::b64_encode;

    #[test]
    fn test_hex_round_trip() {
        let secret = b"webhook-secret";
        let body = br#"{"notification":"messageCreated"}"#;
        let sig = hmac_sha256_hex(secret, body);
        assert!(verify_hmac_sha256(secret, body, &sig));
    }

    #[test]
    fn test_base64_signature_accepted() {
        let secret = b"webhook-secret";
        let body = b"payload bytes";
        let sig = b64_encode(hmac_sha256(secret, body));
        assert!(verify_hmac_sha256(secret, body, &sig));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let secret = b"webhook-secret";
        let sig = hmac_sha256_hex(secret, b"original");
        assert!(!verify_hmac_sha256(secret, b"tampered", &sig));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let sig = hmac_sha256_hex(b"secret-a", b"body");
        assert!(!verify_hmac_sha256(b"secret-b", b"body", &sig));
    }

    #[test]
    fn test_rejects_truncated_signature() {
        let secret = b"webhook-secret";
        let sig = hmac_sha256_hex(secret, b"body");
        assert!(!verify_hmac_sha256(secret, b"body", &sig[..10]));
    }

    #[test]
    fn test_tolerates_surrounding_whitespace() {
        let secret = b"webhook-secret";
        let sig = hmac_sha256_hex(secret, b"body");
        assert!(verify_hmac_sha256(secret, b"body", &format!(" {}\n", sig)));
    }
}
