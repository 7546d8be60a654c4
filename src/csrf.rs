// src/csrf.rs
// Signed double-submit CSRF tokens: an HMAC-SHA256 token carried both in a
// cookie and in the request (header or body) must match byte-for-byte and
// verify independently. Tokens rotate on every successful verification.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{hex_decode, hex_encode};

type HmacSha256 = Hmac<Sha256>;

/// Tokens older than this fail verification even with a valid signature.
pub const TOKEN_TTL_MS: u64 = 86_400_000;

/// Why verification failed. Callers log the variant; the submitter only
/// ever sees [`CsrfRejection::user_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    MissingCookie,
    MissingSubmitted,
    TokenMismatch,
    MalformedToken,
    SignatureMismatch,
    Expired,
}

impl CsrfRejection {
    /// One deliberately vague message for every variant, so a probing
    /// client cannot distinguish expiry from tampering.
    pub fn user_message(&self) -> &'static str {
        "Invalid or missing CSRF token"
    }
}

/// A freshly minted token plus the `Set-Cookie` line that delivers its
/// cookie half.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub set_cookie: String,
}

pub struct CsrfGuard {
    secret: Vec<u8>,
    cookie_name: String,
    header_name: String,
}

impl CsrfGuard {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        cookie_name: impl Into<String>,
        header_name: impl Into<String>,
    ) -> Self {
        CsrfGuard {
            secret: secret.into(),
            cookie_name: cookie_name.into(),
            header_name: header_name.into(),
        }
    }

    pub fn from_env() -> Self {
        CsrfGuard::new(
            crate::config::csrf_secret(),
            crate::config::csrf_cookie_name(),
            crate::config::csrf_header_name(),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Mint a token: `random.timestamp.signature`, all hex/decimal, where
    /// the signature covers the first two segments.
    pub fn issue(&self) -> IssuedToken {
        self.issue_at(crate::now_ms())
    }

    pub(crate) fn issue_at(&self, now_ms: u64) -> IssuedToken {
        let random: [u8; 32] = rand::rng().random();
        let random = hex_encode(&random);
        let signature = self.sign(&random, now_ms);
        let token = format!("{}.{}.{}", random, now_ms, signature);
        let set_cookie = self.set_cookie(&token);
        IssuedToken { token, set_cookie }
    }

    fn sign(&self, random: &str, timestamp_ms: u64) -> String {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret).unwrap();
        mac.update(random.as_bytes());
        mac.update(b".");
        mac.update(timestamp_ms.to_string().as_bytes());
        hex_encode(&mac.finalize().into_bytes())
    }

    /// Double-submit check: both halves present, byte-identical, and each
    /// independently signature- and expiry-valid. Success rotates the
    /// token; the caller must send the returned cookie to the client.
    pub fn verify(
        &self,
        cookie_token: Option<&str>,
        submitted_token: Option<&str>,
    ) -> Result<IssuedToken, CsrfRejection> {
        self.verify_at(cookie_token, submitted_token, crate::now_ms())
    }

    pub(crate) fn verify_at(
        &self,
        cookie_token: Option<&str>,
        submitted_token: Option<&str>,
        now_ms: u64,
    ) -> Result<IssuedToken, CsrfRejection> {
        let cookie = cookie_token.ok_or(CsrfRejection::MissingCookie)?;
        let submitted = submitted_token.ok_or(CsrfRejection::MissingSubmitted)?;
        if cookie.as_bytes().ct_eq(submitted.as_bytes()).unwrap_u8() != 1 {
            return Err(CsrfRejection::TokenMismatch);
        }
        self.verify_token_at(cookie, now_ms)?;
        self.verify_token_at(submitted, now_ms)?;
        Ok(self.issue_at(now_ms))
    }

    fn verify_token_at(&self, token: &str, now_ms: u64) -> Result<(), CsrfRejection> {
        let mut parts = token.split('.');
        let (random, timestamp, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(r), Some(t), Some(s), None) if !r.is_empty() && !s.is_empty() => (r, t, s),
            _ => return Err(CsrfRejection::MalformedToken),
        };
        let timestamp_ms: u64 = timestamp
            .parse()
            .map_err(|_| CsrfRejection::MalformedToken)?;
        let signature = hex_decode(signature).ok_or(CsrfRejection::MalformedToken)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).unwrap();
        mac.update(random.as_bytes());
        mac.update(b".");
        mac.update(timestamp_ms.to_string().as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CsrfRejection::SignatureMismatch)?;

        if now_ms > timestamp_ms.saturating_add(TOKEN_TTL_MS) {
            return Err(CsrfRejection::Expired);
        }
        Ok(())
    }

    fn set_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.cookie_name,
            token,
            TOKEN_TTL_MS / 1_000
        );
        if crate::config::secure_cookies() {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Pull one cookie's value out of a `Cookie:` header.
pub fn cookie_token(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Pull the `csrfToken` field out of a form-urlencoded body.
pub fn form_token(body: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "csrfToken" {
            return None;
        }
        let value = value.replace('+', " ");
        percent_encoding::percent_decode_str(&value)
            .decode_utf8()
            .ok()
            .map(|decoded| decoded.into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: u64 = 3_600_000;

    fn guard() -> CsrfGuard {
        CsrfGuard::new("unit-test-secret", "csrf-token", "x-csrf-token")
    }

    #[test]
    fn round_trip_verifies_and_rotates() {
        let guard = guard();
        let t0 = 1_000_000;
        let issued = guard.issue_at(t0);
        let rotated = guard
            .verify_at(Some(&issued.token), Some(&issued.token), t0 + HOUR_MS)
            .unwrap();
        assert_ne!(rotated.token, issued.token);
        assert!(rotated.set_cookie.starts_with("csrf-token="));
        assert!(rotated.set_cookie.contains("SameSite=Strict"));
    }

    #[test]
    fn token_expires_after_ttl() {
        let guard = guard();
        let t0 = 1_000_000;
        let issued = guard.issue_at(t0);
        let err = guard
            .verify_at(Some(&issued.token), Some(&issued.token), t0 + 25 * HOUR_MS)
            .unwrap_err();
        assert_eq!(err, CsrfRejection::Expired);
    }

    #[test]
    fn tampered_signature_fails() {
        let guard = guard();
        let issued = guard.issue_at(0);
        let mut tampered = issued.token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        let err = guard
            .verify_at(Some(&tampered), Some(&tampered), HOUR_MS)
            .unwrap_err();
        assert_eq!(err, CsrfRejection::SignatureMismatch);
    }

    #[test]
    fn halves_must_match() {
        let guard = guard();
        let a = guard.issue_at(0);
        let b = guard.issue_at(0);
        let err = guard
            .verify_at(Some(&a.token), Some(&b.token), HOUR_MS)
            .unwrap_err();
        assert_eq!(err, CsrfRejection::TokenMismatch);
    }

    #[test]
    fn missing_halves_are_distinct_rejections() {
        let guard = guard();
        let issued = guard.issue_at(0);
        assert_eq!(
            guard.verify_at(None, Some(&issued.token), 0).unwrap_err(),
            CsrfRejection::MissingCookie
        );
        assert_eq!(
            guard.verify_at(Some(&issued.token), None, 0).unwrap_err(),
            CsrfRejection::MissingSubmitted
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let guard = guard();
        for bad in ["", "abc", "a.b", "a.b.c.d", "rand.notanumber.aabb", "rand.123.zz"] {
            let err = guard.verify_at(Some(bad), Some(bad), 0).unwrap_err();
            assert_eq!(err, CsrfRejection::MalformedToken, "{:?}", bad);
        }
    }

    #[test]
    fn secret_mismatch_fails_signature() {
        let issued = guard().issue_at(0);
        let other = CsrfGuard::new("different-secret", "csrf-token", "x-csrf-token");
        let err = other
            .verify_at(Some(&issued.token), Some(&issued.token), 0)
            .unwrap_err();
        assert_eq!(err, CsrfRejection::SignatureMismatch);
    }

    #[test]
    fn rejections_share_one_user_message() {
        assert_eq!(
            CsrfRejection::Expired.user_message(),
            CsrfRejection::TokenMismatch.user_message()
        );
    }

    #[test]
    fn cookie_and_form_extraction() {
        assert_eq!(
            cookie_token("session=abc; csrf-token=tok.1.2; theme=dark", "csrf-token"),
            Some("tok.1.2".to_string())
        );
        assert_eq!(cookie_token("session=abc", "csrf-token"), None);
        assert_eq!(
            form_token("name=Jo&csrfToken=tok%2E1%2E2&x=y"),
            Some("tok.1.2".to_string())
        );
        assert_eq!(form_token("name=Jo"), None);
    }
}
