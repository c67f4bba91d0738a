//! Scan records and ingestion outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A persisted scan event.
///
/// Created exactly once per accepted scan by the storage collaborator
/// and never mutated afterwards; corrections are a separate workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unique record identifier.
    pub id: String,
    /// The receiving session this scan belongs to.
    pub session_id: String,
    /// The scanned payload (RFID tag ID or QR string content).
    pub payload: String,
    /// When the scan was captured.
    pub captured_at: DateTime<Utc>,
    /// Validity flag; always true on the ingestion path.
    pub valid: bool,
}

/// Where a duplicate rejection was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateSource {
    /// Rejected by the fast in-memory suppression cache.
    Cache,
    /// Rejected by the authoritative persistent store.
    Database,
}

impl fmt::Display for DuplicateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Database => write!(f, "database"),
        }
    }
}

/// Outcome of one ingestion attempt.
///
/// Duplicate and invalid outcomes are normal, classified results, not
/// errors; storage failures surface as [`crate::Error::Storage`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ScanOutcome {
    /// The scan was persisted; carries the new record.
    Accepted {
        /// The newly created record.
        record: ScanRecord,
    },
    /// The payload was seen within the suppression window.
    Duplicate {
        /// The rejected payload.
        payload: String,
        /// Which layer detected the duplicate.
        source: DuplicateSource,
    },
    /// The candidate failed tag format validation.
    Invalid {
        /// The rejected candidate, as decoded.
        candidate: String,
    },
}

impl ScanOutcome {
    /// Returns true if the scan was accepted and persisted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Returns true if the scan was rejected as a duplicate.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns the accepted record, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&ScanRecord> {
        match self {
            Self::Accepted { record } => Some(record),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: &str) -> ScanRecord {
        ScanRecord {
            id: "rec-1".to_string(),
            session_id: "sess-1".to_string(),
            payload: payload.to_string(),
            captured_at: Utc::now(),
            valid: true,
        }
    }

    #[test]
    fn outcome_predicates() {
        let accepted = ScanOutcome::Accepted {
            record: record("53004114"),
        };
        assert!(accepted.is_accepted());
        assert!(!accepted.is_duplicate());
        assert_eq!(accepted.record().map(|r| r.payload.as_str()), Some("53004114"));

        let duplicate = ScanOutcome::Duplicate {
            payload: "53004114".to_string(),
            source: DuplicateSource::Cache,
        };
        assert!(duplicate.is_duplicate());
        assert!(duplicate.record().is_none());

        let invalid = ScanOutcome::Invalid {
            candidate: "GG1234".to_string(),
        };
        assert!(!invalid.is_accepted());
        assert!(!invalid.is_duplicate());
    }

    #[test]
    fn duplicate_source_display() {
        assert_eq!(DuplicateSource::Cache.to_string(), "cache");
        assert_eq!(DuplicateSource::Database.to_string(), "database");
    }
}
