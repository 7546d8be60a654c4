// src/store.rs
// Key-value store seam shared by the rate limiter and quiz progress
// persistence. Callers bind a durable backend (Redis-style KV with TTL
// support); the in-memory fallback is a best-effort degradation mode for
// single-instance and dev deployments only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ()>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), ()>;
    /// Store a value that expires `ttl_ms` milliseconds from now. Durable
    /// backends map this onto their native expiry so storage self-cleans.
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl_ms: u64) -> Result<(), ()>;
    fn delete(&self, key: &str) -> Result<(), ()>;
}

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Process-local store. Entries expire lazily on read; nothing is shared
/// across server instances, so rate limits enforced through this store are
/// per-process only.
#[derive(Default)]
pub struct InMemoryStore {
    map: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: Vec<u8>,
    expires_at_ms: Option<u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        if !FALLBACK_WARNED.swap(true, Ordering::Relaxed) {
            eprintln!(
                "[store] in-memory fallback active; rate limits and CSRF state are not \
                 coordinated across instances. Configure a durable KV backend for production."
            );
        }
        InMemoryStore::default()
    }

    fn live_value(entry: &Entry, now_ms: u64) -> Option<Vec<u8>> {
        match entry.expires_at_ms {
            Some(deadline) if now_ms >= deadline => None,
            _ => Some(entry.value.clone()),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ()> {
        let now = crate::now_ms();
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match map.get(key) {
            Some(entry) => match Self::live_value(entry, now) {
                Some(value) => Ok(Some(value)),
                None => {
                    map.remove(key);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ()> {
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at_ms: None,
            },
        );
        Ok(())
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl_ms: u64) -> Result<(), ()> {
        let deadline = crate::now_ms().saturating_add(ttl_ms);
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at_ms: Some(deadline),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), ()> {
        let mut map = self
            .map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", b"v", 0).unwrap();
        // Zero TTL expires immediately.
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn unexpired_ttl_entries_are_visible() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", b"v", 60_000).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn plain_set_clears_previous_ttl() {
        let store = InMemoryStore::new();
        store.set_with_ttl("k", b"old", 0).unwrap();
        store.set("k", b"new").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"new".to_vec()));
    }
}
