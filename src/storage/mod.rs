//! Persistent scan storage.
//!
//! The persistent store is the authoritative source of truth for
//! accepted scans; the in-memory suppression cache is only a fast first
//! line of defense and is rebuilt empty on restart.

mod sqlite;

pub use sqlite::SqliteScanStore;

use crate::Result;
use crate::models::ScanRecord;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Trait for scan storage backends.
pub trait ScanStore: Send + Sync {
    /// Finds the most recent scan of `payload` captured at or after
    /// `since`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] on connectivity or query failure.
    fn find_recent_scan(
        &self,
        payload: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ScanRecord>>;

    /// Inserts a new scan record as a single atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] on connectivity or constraint
    /// failure; in that case no record was created.
    fn insert_scan(
        &self,
        session_id: &str,
        payload: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<ScanRecord>;

    /// Lists the most recent scans, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] on query failure.
    fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>>;

    /// Returns the total number of stored scans.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] on query failure.
    fn count(&self) -> Result<usize> {
        Ok(self.recent_scans(usize::MAX)?.len())
    }
}

/// Helper to acquire a mutex lock with poison recovery.
///
/// If the mutex is poisoned by a panic in another thread, the inner
/// value is recovered and a warning is logged; blocking every later
/// operation on a transient panic would be worse than continuing.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            metrics::counter!("scangate_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Records operation metrics for storage operations.
///
/// Emits `storage_operations_total` and `storage_operation_duration_ms`
/// labeled by backend, operation and status.
pub(crate) fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_lock_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock(&mutex);
        assert_eq!(*guard, 42);
    }

    #[test]
    fn acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let mutex_clone = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard = acquire_lock(&mutex_clone);
                *guard += 1;
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*acquire_lock(&mutex), 10);
    }

    #[test]
    fn record_operation_metrics_does_not_panic() {
        let start = Instant::now();
        record_operation_metrics("sqlite", "insert_scan", start, "success");
        record_operation_metrics("sqlite", "find_recent_scan", start, "error");
    }
}
