//! Per-payload lock arena.
//!
//! The guard must turn N concurrent submissions of the same payload into
//! one winner without serializing unrelated payloads behind a single
//! global lock. Lock handles are created on demand per payload and
//! reclaimed once uncontended.

use crate::storage::acquire_lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Arena of per-payload async locks.
pub struct PayloadLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PayloadLocks {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for `payload`, waiting behind any in-flight
    /// attempt on the same payload. Attempts on other payloads proceed
    /// independently.
    pub async fn acquire(&self, payload: &str) -> PayloadGuard<'_> {
        let handle = {
            let mut map = acquire_lock(&self.locks);
            Arc::clone(
                map.entry(payload.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        let guard = handle.lock_owned().await;
        PayloadGuard {
            arena: self,
            payload: payload.to_string(),
            guard: Some(guard),
        }
    }

    /// Returns the number of live lock handles (for diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.locks).len()
    }

    /// Returns true if no lock handles are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the handle for `payload` if nothing else holds it.
    fn reclaim(&self, payload: &str) {
        let mut map = acquire_lock(&self.locks);
        if let Some(handle) = map.get(payload) {
            // Strong count 1 means only the map references the handle;
            // a waiter or holder would own a clone.
            if Arc::strong_count(handle) == 1 {
                map.remove(payload);
            }
        }
    }
}

impl Default for PayloadLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard holding the serialization point for one payload.
///
/// Dropping the guard releases the lock and reclaims the handle from the
/// arena if no other attempt is waiting on it.
pub struct PayloadGuard<'a> {
    arena: &'a PayloadLocks,
    payload: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PayloadGuard<'_> {
    fn drop(&mut self) {
        // Release the lock (and its Arc clone) before inspecting the
        // arena, otherwise the handle always looks contended.
        self.guard.take();
        self.arena.reclaim(&self.payload);
    }
}
