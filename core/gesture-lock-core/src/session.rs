//! Per-package session unlock flags.
//!
//! A package is locked unless a flag is present. The flag is set by an accepted
//! gesture verdict and removed when the classifier confirms a real exit or when
//! protection is disabled. Sessions live only as long as the monitor process.
//!
//! The store is shared between the monitor thread and whatever applies
//! verdicts, so every operation takes a single map-level lock. Concurrent
//! `clear_session` and `set_session` calls for the same package resolve to
//! whichever acquires the lock second.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Default)]
pub struct SessionStore {
    unlocked: Mutex<BTreeSet<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written set, so the
    // data is still usable after poisoning.
    fn guard(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.unlocked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_unlocked(&self, package: &str) -> bool {
        self.guard().contains(package)
    }

    pub fn set_session(&self, package: &str, unlocked: bool) {
        let mut guard = self.guard();
        if unlocked {
            guard.insert(package.to_string());
            debug!(package = %package, "Session unlocked");
        } else if guard.remove(package) {
            debug!(package = %package, "Session cleared");
        }
    }

    /// Removes the unlock flag. No-op on an already locked package.
    pub fn clear_session(&self, package: &str) {
        self.set_session(package, false);
    }

    pub fn unlocked_packages(&self) -> Vec<String> {
        self.guard().iter().cloned().collect()
    }
}
