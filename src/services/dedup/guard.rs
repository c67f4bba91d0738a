//! Persistent duplicate guard.
//!
//! Coordinates the suppression cache with the storage collaborator to
//! enforce a global, cross-process uniqueness window per payload, and
//! serializes concurrent attempts on the same payload so exactly one
//! wins.

use crate::models::{DuplicateSource, ScanOutcome};
use crate::services::dedup::{CacheDecision, PayloadLocks, SuppressionCache};
use crate::storage::ScanStore;
use crate::{Error, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::instrument;

/// Guard enforcing at-most-one-acceptance per payload per suppression
/// window.
///
/// The check order is: suppression cache (fast path, no storage I/O) →
/// per-payload serialization point → authoritative storage existence
/// check → atomic insert → cache record. The cache is written only
/// after the insert succeeds, so a failed write cannot poison it with a
/// phantom acceptance, and an immediate retry is not falsely suppressed.
pub struct DuplicateGuard<S: ScanStore> {
    store: Arc<S>,
    cache: Arc<SuppressionCache>,
    locks: PayloadLocks,
    /// Suppression window in milliseconds; atomic so configuration
    /// updates apply without pausing in-flight attempts.
    min_scan_interval_ms: AtomicU64,
}

impl<S: ScanStore> DuplicateGuard<S> {
    /// Creates a guard over the given store and cache.
    #[must_use]
    pub fn new(store: Arc<S>, cache: Arc<SuppressionCache>, min_scan_interval: Duration) -> Self {
        Self {
            store,
            cache,
            locks: PayloadLocks::new(),
            min_scan_interval_ms: AtomicU64::new(interval_to_ms(min_scan_interval)),
        }
    }

    /// Returns the suppression window currently in effect.
    #[must_use]
    pub fn min_scan_interval(&self) -> Duration {
        Duration::from_millis(self.min_scan_interval_ms.load(Ordering::Relaxed))
    }

    /// Updates the suppression window for subsequent attempts.
    ///
    /// Also updates the cache's decision window so both layers agree.
    pub fn set_min_scan_interval(&self, interval: Duration) {
        self.min_scan_interval_ms
            .store(interval_to_ms(interval), Ordering::Relaxed);
        self.cache.set_suppression_window(interval);
    }

    /// Attempts to persist one scan of `payload`.
    ///
    /// Returns `Accepted` with the new record, or `Duplicate` naming the
    /// layer that rejected it. Duplicates are normal classified
    /// outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the existence check or the insert
    /// fails; callers must not treat this as "duplicate". The cache is
    /// left unmodified in that case.
    #[instrument(skip(self), fields(operation = "try_save_scan", payload = %payload))]
    pub async fn try_save_scan(&self, session_id: &str, payload: &str) -> Result<ScanOutcome> {
        if payload.trim().is_empty() {
            return Err(Error::InvalidInput("payload cannot be empty".to_string()));
        }

        // Fast path: a fresh cache entry rejects without storage I/O.
        if self.cache.check(payload, Utc::now()) == CacheDecision::Duplicate {
            tracing::debug!("Duplicate suppressed by cache");
            metrics::counter!("scan_duplicates_total", "source" => "cache").increment(1);
            return Ok(ScanOutcome::Duplicate {
                payload: payload.to_string(),
                source: DuplicateSource::Cache,
            });
        }

        // Serialization point: one in-flight attempt per payload past
        // this line. Held only for the existence check and the insert.
        let _guard = self.locks.acquire(payload).await;

        let now = Utc::now();
        let window = self.min_scan_interval();
        let since = now
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::milliseconds(0));

        if let Some(existing) = self.store.find_recent_scan(payload, since)? {
            tracing::debug!(existing_id = %existing.id, "Duplicate found in storage");
            metrics::counter!("scan_duplicates_total", "source" => "database").increment(1);
            return Ok(ScanOutcome::Duplicate {
                payload: payload.to_string(),
                source: DuplicateSource::Database,
            });
        }

        let record = self.store.insert_scan(session_id, payload, now)?;

        // Only after the authoritative write succeeded.
        self.cache.record(payload, now);

        tracing::info!(record_id = %record.id, "Scan accepted");
        metrics::counter!("scans_accepted_total").increment(1);
        Ok(ScanOutcome::Accepted { record })
    }

    /// Removes expired suppression cache entries.
    ///
    /// Returns the number of removed entries.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup(Utc::now())
    }

    /// Returns the suppression cache shared with this guard.
    #[must_use]
    pub fn cache(&self) -> &SuppressionCache {
        &self.cache
    }
}

fn interval_to_ms(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}
