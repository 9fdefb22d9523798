//! Keyed async locks.
//!
//! One mutex per key, created on demand, so work on unrelated keys never contends.
//! Entries nobody holds or waits on are pruned as the table grows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Prune idle entries once the table holds this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// A table of per-key mutexes.
#[derive(Debug, Default)]
pub struct KeyLocks {
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.len() >= PRUNE_THRESHOLD {
                entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(entries.entry(key.to_string()).or_default())
        };
        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key; released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Exclusive processing right for one webhook event.
///
/// Held by the reconciler from the dedup check until the event is committed or its
/// failure recorded. A concurrent delivery of the same event waits here.
#[derive(Debug)]
pub struct EventLease {
    _guard: KeyGuard,
}

impl From<KeyGuard> for EventLease {
    fn from(guard: KeyGuard) -> Self {
        Self { _guard: guard }
    }
}

/// Exclusive write access to one subscription row.
///
/// Held across a read-modify-write of the row: webhook effects from the read until
/// the commit, and lifecycle changes from the reload until the write.
#[derive(Debug)]
pub struct SubscriptionLease {
    _guard: KeyGuard,
}

impl From<KeyGuard> for SubscriptionLease {
    fn from(guard: KeyGuard) -> Self {
        Self { _guard: guard }
    }
}
