// src/lib.rs
// Form-intake guard library for the practice website.
//
// Turns a raw form submission plus configuration into a verdict, response
// headers, and a sanitized payload. The HTTP layer, CORS wiring, and
// persistence are the caller's job; this crate owns the guard stages in
// between: rate limiting, CSRF verification, validation, spam scoring, and
// sanitization, plus the quiz scoring state machine.

pub mod config; // Env-driven settings and per-endpoint rate policies
pub mod csrf; // Double-submit CSRF tokens (HMAC-signed, time-boxed)
pub mod identity; // Client identity and rate-limit key derivation
pub mod pipeline; // Per-endpoint composition of the guard stages
pub mod quiz; // Quiz scoring state machine and submission taxonomy
pub mod rate; // Sliding-window rate limiting
pub mod sanitize; // Type-directed input sanitization
pub mod spam; // Advisory spam signal scoring
pub mod store; // Key-value store seam and in-memory fallback
pub mod validate; // Field and form validation

#[cfg(test)]
mod test_support;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub(crate) fn hex_decode(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    let bytes = input.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let bytes = [0u8, 1, 0x7f, 0xff, 0xa5];
        let encoded = hex_encode(&bytes);
        assert_eq!(encoded, "00017fffa5");
        assert_eq!(hex_decode(&encoded).unwrap(), bytes.to_vec());
    }

    #[test]
    fn hex_decode_rejects_bad_input() {
        assert!(hex_decode("abc").is_none());
        assert!(hex_decode("zz").is_none());
    }
}
