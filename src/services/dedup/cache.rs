//! In-process duplicate suppression cache.
//!
//! A time-bounded map from scanned payload to the timestamp of its last
//! accepted occurrence. Provides fast-path rejection of immediate
//! re-reads without touching storage. The cache is not persisted; after
//! a restart the persistent guard is the authority of record.

use crate::storage::acquire_lock;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

/// Decision returned by a cache check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// No fresh entry; the payload may proceed.
    Accepted,
    /// The payload was accepted within the suppression window.
    Duplicate,
}

struct Inner {
    /// Payload to last-accepted timestamp. Capacity-bounded so a stuck
    /// reader cannot grow the map without bound.
    entries: LruCache<String, DateTime<Utc>>,
    /// Window during which a repeated payload is rejected.
    suppression_window: Duration,
}

/// Time-bounded duplicate suppression cache.
///
/// Duplicate rejection is anchored to the first accepted scan: a
/// rejected re-read does not refresh the stored timestamp, so rapid-fire
/// duplicates age out `suppression_window` after the original
/// acceptance, not after the last attempt. Checks use `peek`, which also
/// leaves the LRU order untouched.
///
/// Entries idle longer than `retention` are removed by [`cleanup`],
/// which callers run opportunistically or on a schedule; eviction is
/// advisory and never affects correctness because the persistent guard
/// re-checks storage.
///
/// [`cleanup`]: SuppressionCache::cleanup
pub struct SuppressionCache {
    inner: Mutex<Inner>,
    retention: Duration,
}

impl SuppressionCache {
    /// Creates a cache.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of entries (zero is clamped to one)
    /// * `suppression_window` - Duplicate rejection window
    /// * `retention` - How long an idle entry survives until cleanup
    #[must_use]
    pub fn new(capacity: usize, suppression_window: Duration, retention: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                suppression_window,
            }),
            retention,
        }
    }

    /// Checks whether `payload` was accepted within the suppression
    /// window, without mutating the cache.
    #[must_use]
    pub fn check(&self, payload: &str, now: DateTime<Utc>) -> CacheDecision {
        let inner = acquire_lock(&self.inner);
        decide(&inner, payload, now)
    }

    /// Records an accepted scan of `payload` at `now`.
    ///
    /// Called after the authoritative write succeeds, never before, so a
    /// failed write cannot leave a phantom acceptance behind.
    pub fn record(&self, payload: &str, now: DateTime<Utc>) {
        let mut inner = acquire_lock(&self.inner);
        inner.entries.put(payload.to_string(), now);
        metrics::gauge!("suppression_cache_size").set(inner.entries.len() as f64);
    }

    /// Atomically checks and, on acceptance, records `payload` at `now`.
    ///
    /// Two concurrent calls for the same payload cannot both observe "no
    /// entry"; exactly one wins. A duplicate result leaves the existing
    /// entry untouched.
    pub fn check_and_record(&self, payload: &str, now: DateTime<Utc>) -> CacheDecision {
        let mut inner = acquire_lock(&self.inner);
        match decide(&inner, payload, now) {
            CacheDecision::Duplicate => {
                metrics::counter!("suppression_cache_duplicates_total").increment(1);
                CacheDecision::Duplicate
            },
            CacheDecision::Accepted => {
                inner.entries.put(payload.to_string(), now);
                metrics::gauge!("suppression_cache_size").set(inner.entries.len() as f64);
                CacheDecision::Accepted
            },
        }
    }

    /// Removes every entry older than the retention window.
    ///
    /// Returns the number of removed entries. Holds the same lock as the
    /// check paths, so cleanup cannot race an insert into losing it.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let mut inner = acquire_lock(&self.inner);

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, accepted_at)| !within(now, **accepted_at, self.retention))
            .map(|(payload, _)| payload.clone())
            .collect();

        for payload in &expired {
            inner.entries.pop(payload);
        }

        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Suppression cache cleanup");
            metrics::counter!("suppression_cache_evicted_total").increment(expired.len() as u64);
        }
        metrics::gauge!("suppression_cache_size").set(inner.entries.len() as f64);
        expired.len()
    }

    /// Updates the suppression window for subsequent checks.
    pub fn set_suppression_window(&self, window: Duration) {
        let mut inner = acquire_lock(&self.inner);
        inner.suppression_window = window;
    }

    /// Returns the current number of entries, including entries that
    /// have expired but not yet been cleaned up.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.inner).entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decide(inner: &Inner, payload: &str, now: DateTime<Utc>) -> CacheDecision {
    match inner.entries.peek(payload) {
        Some(accepted_at) if within(now, *accepted_at, inner.suppression_window) => {
            CacheDecision::Duplicate
        },
        _ => CacheDecision::Accepted,
    }
}

/// True if `timestamp` is within `window` of `now`. A future-dated
/// timestamp (clock stepped backwards) counts as within the window.
fn within(now: DateTime<Utc>, timestamp: DateTime<Utc>, window: Duration) -> bool {
    match now.signed_duration_since(timestamp).to_std() {
        Ok(age) => age < window,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cache() -> SuppressionCache {
        SuppressionCache::new(
            128,
            Duration::from_millis(1000),
            Duration::from_secs(24 * 60 * 60),
        )
    }

    #[test]
    fn first_sighting_is_accepted() {
        let cache = cache();
        let now = Utc::now();
        assert_eq!(cache.check_and_record("X1", now), CacheDecision::Accepted);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rapid_reread_is_duplicate() {
        let cache = cache();
        let t0 = Utc::now();
        assert_eq!(cache.check_and_record("X1", t0), CacheDecision::Accepted);

        let t1 = t0 + ChronoDuration::milliseconds(100);
        assert_eq!(cache.check_and_record("X1", t1), CacheDecision::Duplicate);
    }

    #[test]
    fn reread_outside_window_is_accepted() {
        let cache = cache();
        let t0 = Utc::now();
        assert_eq!(cache.check_and_record("X1", t0), CacheDecision::Accepted);

        let t1 = t0 + ChronoDuration::milliseconds(1100);
        assert_eq!(cache.check_and_record("X1", t1), CacheDecision::Accepted);
    }

    #[test]
    fn duplicate_does_not_refresh_window() {
        let cache = cache();
        let t0 = Utc::now();
        assert_eq!(cache.check_and_record("X1", t0), CacheDecision::Accepted);

        // A duplicate at t0+900ms must not extend the window: at
        // t0+1050ms the original acceptance has aged out.
        let t1 = t0 + ChronoDuration::milliseconds(900);
        assert_eq!(cache.check_and_record("X1", t1), CacheDecision::Duplicate);

        let t2 = t0 + ChronoDuration::milliseconds(1050);
        assert_eq!(cache.check_and_record("X1", t2), CacheDecision::Accepted);
    }

    #[test]
    fn check_is_non_mutating() {
        let cache = cache();
        let now = Utc::now();
        assert_eq!(cache.check("X1", now), CacheDecision::Accepted);
        assert!(cache.is_empty());

        cache.record("X1", now);
        assert_eq!(cache.check("X1", now), CacheDecision::Duplicate);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_payloads_do_not_interfere() {
        let cache = cache();
        let now = Utc::now();
        assert_eq!(cache.check_and_record("X1", now), CacheDecision::Accepted);
        assert_eq!(cache.check_and_record("X2", now), CacheDecision::Accepted);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let cache = cache();
        let now = Utc::now();

        cache.record("OLD1", now - ChronoDuration::hours(25));
        cache.record("FRESH", now);

        let removed = cache.cleanup(now);
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);

        // The fresh entry is still authoritative for suppression.
        assert_eq!(cache.check("FRESH", now), CacheDecision::Duplicate);
        assert_eq!(cache.check("OLD1", now), CacheDecision::Accepted);
    }

    #[test]
    fn cleanup_on_empty_cache_is_noop() {
        let cache = cache();
        assert_eq!(cache.cleanup(Utc::now()), 0);
    }

    #[test]
    fn capacity_bounds_entries() {
        let cache = SuppressionCache::new(
            2,
            Duration::from_millis(1000),
            Duration::from_secs(3600),
        );
        let now = Utc::now();
        cache.record("A", now);
        cache.record("B", now);
        cache.record("C", now);
        assert_eq!(cache.len(), 2);
        // Least recently inserted entry was evicted.
        assert_eq!(cache.check("A", now), CacheDecision::Accepted);
    }

    #[test]
    fn window_update_applies_to_later_checks() {
        let cache = cache();
        let t0 = Utc::now();
        cache.record("X1", t0);

        cache.set_suppression_window(Duration::from_millis(100));
        let t1 = t0 + ChronoDuration::milliseconds(500);
        assert_eq!(cache.check("X1", t1), CacheDecision::Accepted);
    }

    #[test]
    fn future_dated_entry_counts_as_fresh() {
        let cache = cache();
        let now = Utc::now();
        cache.record("X1", now + ChronoDuration::seconds(30));
        assert_eq!(cache.check("X1", now), CacheDecision::Duplicate);
    }

    #[test]
    fn concurrent_check_and_record_admits_exactly_one() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(cache());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.check_and_record("X1", now))
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| *d == CacheDecision::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }
}
