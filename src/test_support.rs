// src/test_support.rs
// Shared test helpers. Tests that read or write process environment
// variables serialize on this lock so parallel test threads cannot observe
// each other's overrides.

use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
