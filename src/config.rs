// src/config.rs
// Environment-driven settings for the intake guard. Defaults match the
// hardened policy numbers; each tunable can be overridden per deployment
// and is clamped to a sane range.

use std::env;

use serde::{Deserialize, Serialize};

use crate::rate::RatePolicy;

pub const DEFAULT_COOKIE_NAME: &str = "csrf-token";
pub const DEFAULT_HEADER_NAME: &str = "x-csrf-token";

const RATE_MAX_MIN: u32 = 1;
const RATE_MAX_MAX: u32 = 10_000;
const RATE_WINDOW_MS_MIN: u64 = 1_000;
const RATE_WINDOW_MS_MAX: u64 = 24 * 60 * 60 * 1_000;

/// Logical endpoints guarded by the pipeline, each with its own rate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Standard,
    Contact,
    Appointment,
    Quiz,
    Auth,
}

impl Endpoint {
    fn env_name(self) -> &'static str {
        match self {
            Endpoint::Standard => "STANDARD",
            Endpoint::Contact => "CONTACT",
            Endpoint::Appointment => "APPOINTMENT",
            Endpoint::Quiz => "QUIZ",
            Endpoint::Auth => "AUTH",
        }
    }

    fn default_policy(self) -> RatePolicy {
        match self {
            // 60 requests per minute for plain API reads.
            Endpoint::Standard => RatePolicy {
                window_ms: 60_000,
                max: 60,
                key_prefix: "rl:",
                audit_on_breach: false,
            },
            // 5 submissions per 5 minutes.
            Endpoint::Contact => RatePolicy {
                window_ms: 300_000,
                max: 5,
                key_prefix: "rl:contact:",
                audit_on_breach: false,
            },
            // 3 bookings per minute.
            Endpoint::Appointment => RatePolicy {
                window_ms: 60_000,
                max: 3,
                key_prefix: "rl:appointment:",
                audit_on_breach: false,
            },
            // 3 quiz submissions per hour.
            Endpoint::Quiz => RatePolicy {
                window_ms: 3_600_000,
                max: 3,
                key_prefix: "rl:quiz:",
                audit_on_breach: false,
            },
            // 5 attempts per 15 minutes; breaches are audit-logged.
            Endpoint::Auth => RatePolicy {
                window_ms: 900_000,
                max: 5,
                key_prefix: "rl:auth:",
                audit_on_breach: true,
            },
        }
    }

    /// Rate policy for this endpoint, with `FORMGATE_RATE_<ENDPOINT>_MAX`
    /// and `FORMGATE_RATE_<ENDPOINT>_WINDOW_MS` env overrides applied.
    pub fn policy(self) -> RatePolicy {
        let mut policy = self.default_policy();
        let name = self.env_name();
        policy.max = parse_clamped_u32(
            env::var(format!("FORMGATE_RATE_{}_MAX", name)).ok().as_deref(),
            policy.max,
            RATE_MAX_MIN,
            RATE_MAX_MAX,
        );
        policy.window_ms = parse_clamped_u64(
            env::var(format!("FORMGATE_RATE_{}_WINDOW_MS", name))
                .ok()
                .as_deref(),
            policy.window_ms,
            RATE_WINDOW_MS_MIN,
            RATE_WINDOW_MS_MAX,
        );
        policy
    }
}

fn parse_bool_env(value: Option<&str>) -> Option<bool> {
    value.map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn parse_clamped_u32(value: Option<&str>, default_value: u32, min: u32, max: u32) -> u32 {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default_value)
        .clamp(min, max)
}

fn parse_clamped_u64(value: Option<&str>, default_value: u64, min: u64, max: u64) -> u64 {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_value)
        .clamp(min, max)
}

/// Secret used to sign CSRF tokens. `FORMGATE_CSRF_SECRET` wins, with
/// `FORMGATE_API_KEY` as a fallback for deployments that share one secret.
pub fn csrf_secret() -> String {
    env::var("FORMGATE_CSRF_SECRET")
        .or_else(|_| env::var("FORMGATE_API_KEY"))
        .unwrap_or_else(|_| "changeme-csrf-secret".to_string())
}

pub fn csrf_cookie_name() -> String {
    env::var("FORMGATE_CSRF_COOKIE_NAME").unwrap_or_else(|_| DEFAULT_COOKIE_NAME.to_string())
}

pub fn csrf_header_name() -> String {
    env::var("FORMGATE_CSRF_HEADER_NAME").unwrap_or_else(|_| DEFAULT_HEADER_NAME.to_string())
}

/// Mark issued cookies `Secure`. Off by default so local dev over plain
/// HTTP keeps working.
pub fn secure_cookies() -> bool {
    parse_bool_env(env::var("FORMGATE_SECURE_COOKIES").ok().as_deref()).unwrap_or(false)
}

/// On rate-limiter store errors, admit the request rather than failing the
/// endpoint. Defaults to open: availability over strict enforcement.
pub fn fail_open() -> bool {
    parse_bool_env(env::var("FORMGATE_FAIL_OPEN").ok().as_deref()).unwrap_or(true)
}

/// Origins the HTTP layer should accept for credentialed requests. The
/// CORS wiring itself is the caller's job; this is only the parsed list.
pub fn allowed_origins() -> Vec<String> {
    env::var("FORMGATE_ALLOWED_ORIGINS")
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
