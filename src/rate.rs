// src/rate.rs
// Sliding-window rate limiting over a pluggable key-value store. The window
// is the raw list of admission timestamps, pruned on every decision, so the
// limit is exact rather than bucketed.

use std::sync::Mutex;

use once_cell::sync::Lazy;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::store::KeyValueStore;

/// Per-endpoint limiting policy. Policy literals live in `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub window_ms: u64,
    pub max: u32,
    pub key_prefix: &'static str,
    pub audit_on_breach: bool,
}

/// Outcome of one admission check, carrying everything a caller needs to
/// build client-facing rate-limit headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
    pub retry_after_secs: u64,
}

// The store trait has no compare-and-swap, so read-modify-write is made
// atomic within this process. Cross-instance races are accepted; see the
// in-memory fallback warning in `store`.
static ADMIT_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Check and record one request for `key` under `policy`.
pub fn admit<S: KeyValueStore>(store: &S, key: &str, policy: &RatePolicy) -> RateDecision {
    admit_at(store, key, policy, crate::now_ms(), crate::config::fail_open())
}

/// Admission against an explicit clock. `fail_open` selects the behavior
/// when the store cannot be read: admit (availability) or deny (safety).
pub fn admit_at<S: KeyValueStore>(
    store: &S,
    key: &str,
    policy: &RatePolicy,
    now_ms: u64,
    fail_open: bool,
) -> RateDecision {
    let _guard = ADMIT_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let storage_key = format!("{}{}", policy.key_prefix, key);

    let window = match store.get(&storage_key) {
        Ok(raw) => raw
            .and_then(|bytes| serde_json::from_slice::<Vec<u64>>(&bytes).ok())
            .unwrap_or_default(),
        Err(()) => {
            eprintln!(
                "[rate] store read failed for {}; failing {}",
                storage_key,
                if fail_open { "open" } else { "closed" }
            );
            return unavailable_decision(policy, now_ms, fail_open);
        }
    };

    let mut window: Vec<u64> = window
        .into_iter()
        .filter(|ts| ts.saturating_add(policy.window_ms) > now_ms)
        .collect();
    let oldest = window.iter().copied().min();

    if window.len() >= policy.max as usize {
        let reset_at_ms = oldest.unwrap_or(now_ms).saturating_add(policy.window_ms);
        if policy.audit_on_breach {
            eprintln!(
                "[rate] audit: limit breach on {} ({} requests in {}ms window)",
                storage_key,
                window.len(),
                policy.window_ms
            );
        }
        return RateDecision {
            allowed: false,
            limit: policy.max,
            remaining: 0,
            reset_at_ms,
            retry_after_secs: ceil_secs(reset_at_ms.saturating_sub(now_ms)),
        };
    }

    window.push(now_ms);
    match serde_json::to_vec(&window) {
        Ok(bytes) => {
            if store
                .set_with_ttl(&storage_key, &bytes, policy.window_ms)
                .is_err()
            {
                eprintln!("[rate] store write failed for {}; admitting anyway", storage_key);
            }
        }
        Err(err) => eprintln!("[rate] window serialization failed: {}", err),
    }

    let remaining = policy.max - window.len() as u32;
    RateDecision {
        allowed: true,
        limit: policy.max,
        remaining,
        reset_at_ms: oldest.unwrap_or(now_ms).saturating_add(policy.window_ms),
        retry_after_secs: 0,
    }
}

fn unavailable_decision(policy: &RatePolicy, now_ms: u64, fail_open: bool) -> RateDecision {
    RateDecision {
        allowed: fail_open,
        limit: policy.max,
        remaining: if fail_open { policy.max } else { 0 },
        reset_at_ms: now_ms.saturating_add(policy.window_ms),
        retry_after_secs: if fail_open {
            0
        } else {
            ceil_secs(policy.window_ms)
        },
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1_000)
}

/// Client-facing headers for a decision; `Retry-After` only when denied.
pub fn rate_limit_headers(decision: &RateDecision) -> Vec<(String, String)> {
    let reset = OffsetDateTime::from_unix_timestamp_nanos(decision.reset_at_ms as i128 * 1_000_000)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| decision.reset_at_ms.to_string());
    let mut headers = vec![
        ("X-RateLimit-Limit".to_string(), decision.limit.to_string()),
        (
            "X-RateLimit-Remaining".to_string(),
            decision.remaining.to_string(),
        ),
        ("X-RateLimit-Reset".to_string(), reset),
    ];
    if !decision.allowed {
        headers.push((
            "Retry-After".to_string(),
            decision.retry_after_secs.to_string(),
        ));
    }
    headers
}
