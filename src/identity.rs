// src/identity.rs
// Client identity for rate limiting. The forwarded-for header is spoofable
// behind an untrusted proxy; callers that terminate TLS themselves should
// pass the socket address and ignore the header.

use sha2::{Digest, Sha256};

/// Best available client identity: the first `X-Forwarded-For` entry when it
/// parses as an IP address, otherwise the socket address, otherwise a fixed
/// sentinel that lumps unidentifiable clients into one bucket.
pub fn client_identity(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> String {
    if let Some(header) = forwarded_for {
        if let Some(first) = header.split(',').next() {
            let candidate = first.trim();
            if candidate.parse::<std::net::IpAddr>().is_ok() {
                return candidate.to_string();
            }
        }
    }
    remote_addr
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Stricter identity binding the IP to the user agent, for endpoints where
/// one NAT'd address should not exhaust the shared budget.
pub fn strict_identity(ip: &str, user_agent: Option<&str>) -> String {
    let ua = user_agent.unwrap_or("unknown");
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b":");
    hasher.update(ua.as_bytes());
    crate::hex_encode(&hasher.finalize())
}

/// Authenticated callers are limited per account rather than per address.
pub fn user_identity(user_id: Option<&str>, ip: &str) -> String {
    match user_id {
        Some(id) if !id.trim().is_empty() => format!("user:{}", id.trim()),
        _ => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_first_entry_wins() {
        let id = client_identity(Some("203.0.113.7, 10.0.0.1"), Some("10.0.0.1"));
        assert_eq!(id, "203.0.113.7");
    }

    #[test]
    fn garbage_forwarded_header_falls_back_to_socket() {
        let id = client_identity(Some("not-an-ip"), Some("198.51.100.2"));
        assert_eq!(id, "198.51.100.2");
        assert_eq!(client_identity(Some("not-an-ip"), None), "unknown");
    }

    #[test]
    fn ipv6_identities_parse() {
        let id = client_identity(Some("2001:db8::1"), None);
        assert_eq!(id, "2001:db8::1");
    }

    #[test]
    fn strict_identity_is_stable_and_ua_sensitive() {
        let a = strict_identity("1.2.3.4", Some("Mozilla/5.0"));
        let b = strict_identity("1.2.3.4", Some("Mozilla/5.0"));
        let c = strict_identity("1.2.3.4", Some("curl/8.0"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn user_identity_prefers_account_id() {
        assert_eq!(user_identity(Some("u42"), "1.2.3.4"), "user:u42");
        assert_eq!(user_identity(Some("  "), "1.2.3.4"), "1.2.3.4");
        assert_eq!(user_identity(None, "1.2.3.4"), "1.2.3.4");
    }
}
