//! `SQLite`-based scan store.
//!
//! Reference backend for the [`ScanStore`] trait. The production system
//! may point this trait at a different relational product; the contract
//! stays the same.

use crate::models::ScanRecord;
use crate::storage::{ScanStore, acquire_lock, record_operation_metrics};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// `SQLite`-backed scan store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. WAL mode allows
/// concurrent readers with a single writer, and the `busy_timeout`
/// pragma waits for locks instead of failing immediately.
pub struct SqliteScanStore {
    /// Connection to the `SQLite` database.
    ///
    /// Protected by a mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database file (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteScanStore {
    /// Opens (or creates) a scan store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::Storage {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory scan store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Initializes pragmas and the schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // WAL for concurrent readers, busy_timeout to ride out contention.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        // captured_at is stored as Unix milliseconds; the suppression
        // window is sub-second so whole seconds are not enough.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                valid INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )
        .map_err(|e| Error::Storage {
            operation: "create_scans_table".to_string(),
            cause: e.to_string(),
        })?;

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_payload_captured
             ON scans(payload, captured_at DESC)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_session ON scans(session_id)",
            [],
        );

        Ok(())
    }
}

/// Raw row shape as read from the `scans` table.
struct ScanRow {
    id: String,
    session_id: String,
    payload: String,
    captured_at_millis: i64,
    valid: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        payload: row.get(2)?,
        captured_at_millis: row.get(3)?,
        valid: row.get(4)?,
    })
}

fn build_record(row: ScanRow) -> Result<ScanRecord> {
    let captured_at = Utc
        .timestamp_millis_opt(row.captured_at_millis)
        .single()
        .ok_or_else(|| Error::Storage {
            operation: "decode_captured_at".to_string(),
            cause: format!("timestamp {} out of range", row.captured_at_millis),
        })?;

    Ok(ScanRecord {
        id: row.id,
        session_id: row.session_id,
        payload: row.payload,
        captured_at,
        valid: row.valid != 0,
    })
}

impl ScanStore for SqliteScanStore {
    #[instrument(skip(self), fields(operation = "find_recent_scan", backend = "sqlite"))]
    fn find_recent_scan(
        &self,
        payload: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<ScanRecord>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let row = conn
                .query_row(
                    "SELECT id, session_id, payload, captured_at, valid
                     FROM scans
                     WHERE payload = ?1 AND captured_at >= ?2
                     ORDER BY captured_at DESC
                     LIMIT 1",
                    params![payload, since.timestamp_millis()],
                    read_row,
                )
                .optional()
                .map_err(|e| Error::Storage {
                    operation: "find_recent_scan".to_string(),
                    cause: e.to_string(),
                })?;

            row.map(build_record).transpose()
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "find_recent_scan", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "insert_scan", backend = "sqlite"))]
    fn insert_scan(
        &self,
        session_id: &str,
        payload: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<ScanRecord> {
        let start = Instant::now();
        let result = (|| {
            let record = ScanRecord {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                payload: payload.to_string(),
                captured_at,
                valid: true,
            };

            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO scans (id, session_id, payload, captured_at, valid)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.session_id,
                    record.payload,
                    record.captured_at.timestamp_millis(),
                    i64::from(record.valid),
                ],
            )
            .map_err(|e| Error::Storage {
                operation: "insert_scan".to_string(),
                cause: e.to_string(),
            })?;

            Ok(record)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "insert_scan", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "recent_scans", backend = "sqlite"))]
    fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, payload, captured_at, valid
                     FROM scans
                     ORDER BY captured_at DESC
                     LIMIT ?1",
                )
                .map_err(|e| Error::Storage {
                    operation: "prepare_recent_scans".to_string(),
                    cause: e.to_string(),
                })?;

            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![limit], read_row)
                .map_err(|e| Error::Storage {
                    operation: "recent_scans".to_string(),
                    cause: e.to_string(),
                })?;

            let mut records = Vec::new();
            for row in rows {
                let row = row.map_err(|e| Error::Storage {
                    operation: "recent_scans_row".to_string(),
                    cause: e.to_string(),
                })?;
                records.push(build_record(row)?);
            }

            Ok(records)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "recent_scans", start, status);
        result
    }

    #[instrument(skip(self), fields(operation = "count", backend = "sqlite"))]
    fn count(&self) -> Result<usize> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))
                .map_err(|e| Error::Storage {
                    operation: "count".to_string(),
                    cause: e.to_string(),
                })?;

            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Ok(count as usize)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "count", start, status);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn insert_and_find_recent() {
        let store = SqliteScanStore::in_memory().unwrap();
        let now = Utc::now();

        let record = store.insert_scan("sess-1", "53004114", now).unwrap();
        assert_eq!(record.payload, "53004114");
        assert!(record.valid);

        let found = store
            .find_recent_scan("53004114", now - ChronoDuration::seconds(1))
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));
    }

    #[test]
    fn find_recent_ignores_older_scans() {
        let store = SqliteScanStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert_scan("sess-1", "53004114", now - ChronoDuration::seconds(10))
            .unwrap();

        let found = store
            .find_recent_scan("53004114", now - ChronoDuration::seconds(1))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn find_recent_ignores_other_payloads() {
        let store = SqliteScanStore::in_memory().unwrap();
        let now = Utc::now();

        store.insert_scan("sess-1", "53004114", now).unwrap();

        let found = store
            .find_recent_scan("AABBCCDD", now - ChronoDuration::seconds(1))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn find_recent_returns_newest_match() {
        let store = SqliteScanStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert_scan("sess-1", "53004114", now - ChronoDuration::milliseconds(800))
            .unwrap();
        let newest = store.insert_scan("sess-1", "53004114", now).unwrap();

        let found = store
            .find_recent_scan("53004114", now - ChronoDuration::seconds(5))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newest.id);
    }

    #[test]
    fn captured_at_preserves_millisecond_precision() {
        let store = SqliteScanStore::in_memory().unwrap();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();

        store.insert_scan("sess-1", "53004114", at).unwrap();

        let found = store
            .find_recent_scan("53004114", at - ChronoDuration::milliseconds(1))
            .unwrap()
            .unwrap();
        assert_eq!(found.captured_at, at);
    }

    #[test]
    fn recent_scans_newest_first() {
        let store = SqliteScanStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert_scan("sess-1", "AA000001", now - ChronoDuration::seconds(2))
            .unwrap();
        store
            .insert_scan("sess-1", "AA000002", now - ChronoDuration::seconds(1))
            .unwrap();
        store.insert_scan("sess-1", "AA000003", now).unwrap();

        let scans = store.recent_scans(2).unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].payload, "AA000003");
        assert_eq!(scans[1].payload, "AA000002");
    }

    #[test]
    fn count_tracks_inserts() {
        let store = SqliteScanStore::in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);

        let now = Utc::now();
        store.insert_scan("sess-1", "AA000001", now).unwrap();
        store.insert_scan("sess-1", "AA000002", now).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn db_path_reported() {
        let store = SqliteScanStore::in_memory().unwrap();
        assert!(store.db_path().is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.db");
        let store = SqliteScanStore::new(&path).unwrap();
        assert_eq!(store.db_path().map(PathBuf::as_path), Some(path.as_path()));
    }
}
