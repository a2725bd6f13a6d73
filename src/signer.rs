use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload for delivery: hex HMAC-SHA256 over
/// `"<timestamp_millis>.<body>"` with the subscription's shared secret.
///
/// Deterministic, so the receiver can recompute and compare. The body must
/// be the exact bytes that go on the wire.
pub fn sign(secret: &str, timestamp_millis: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac-sha256 accepts keys of any length");
    mac.update(timestamp_millis.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Receiver-side check: recompute the signature over the received timestamp
/// and raw body and compare in constant time.
pub fn verify(secret: &str, timestamp_millis: i64, body: &[u8], signature_hex: &str) -> bool {
    let expected = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(timestamp_millis.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Receiver-side check: the signed timestamp must fall within `tolerance`
/// of the receiver's clock, in either direction.
pub fn is_timestamp_fresh(timestamp_millis: i64, now_millis: i64, tolerance: Duration) -> bool {
    let skew = (now_millis - timestamp_millis).unsigned_abs() as u128;
    skew <= tolerance.as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_is_deterministic() {
        let a = sign("secret", 1_700_000_000_000, b"{\"event\":\"note.updated\"}");
        let b = sign("secret", 1_700_000_000_000, b"{\"event\":\"note.updated\"}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn any_input_change_changes_the_digest() {
        let base = sign("secret", 1000, b"body");
        assert_ne!(base, sign("other", 1000, b"body"));
        assert_ne!(base, sign("secret", 1001, b"body"));
        assert_ne!(base, sign("secret", 1000, b"body2"));
    }

    #[test]
    fn verify_accepts_own_signature() {
        let sig = sign("secret", 42, b"payload");
        assert!(verify("secret", 42, b"payload", &sig));
        assert!(!verify("secret", 43, b"payload", &sig));
        assert!(!verify("wrong", 42, b"payload", &sig));
        assert!(!verify("secret", 42, b"payload", "not-hex"));
    }

    #[test]
    fn freshness_window_is_symmetric() {
        let tolerance = Duration::from_secs(300);
        assert!(is_timestamp_fresh(1_000_000, 1_000_000, tolerance));
        assert!(is_timestamp_fresh(1_000_000, 1_000_000 + 299_999, tolerance));
        assert!(is_timestamp_fresh(1_000_000 + 299_999, 1_000_000, tolerance));
        assert!(!is_timestamp_fresh(1_000_000, 1_000_000 + 300_001, tolerance));
        assert!(!is_timestamp_fresh(1_000_000 + 300_001, 1_000_000, tolerance));
    }
}
