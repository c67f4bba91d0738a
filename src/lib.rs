//! # Scangate
//!
//! Scan ingestion and duplicate suppression for RFID/QR goods-receipt
//! stations.
//!
//! A keyboard-emulating RFID reader delivers tag IDs as keystroke
//! bursts; QR scanners submit payloads directly. Scangate reconstructs
//! discrete tag identifiers from the keystroke stream, validates them,
//! suppresses duplicate reads through a two-tier guard (in-process cache
//! plus an authoritative persistent check), and records exactly one scan
//! per physical scan event.
//!
//! ## Example
//!
//! ```rust,ignore
//! use scangate::{EventBus, ScanConfig, ScanIngestor, SqliteScanStore, UnmanagedSource};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteScanStore::new("./scans.db")?);
//! let ingestor = ScanIngestor::new(ScanConfig::load_default(), store, EventBus::default());
//! ingestor.start(&mut UnmanagedSource, "session-42");
//!
//! for c in "53004114".chars() {
//!     ingestor.handle_char(c);
//! }
//! let outcome = ingestor.handle_terminator().await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod decoder;
pub mod input;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{MIN_SCAN_INTERVAL_FLOOR, ScanConfig};
pub use decoder::{DecoderState, KeystrokeDecoder};
pub use input::{InputSource, RegistrationHealth, UnmanagedSource};
pub use models::{
    DuplicateSource, EventMeta, ScanEvent, ScanOutcome, ScanRecord, TagId, is_valid_tag,
};
pub use observability::EventBus;
pub use services::{
    CacheDecision, DuplicateGuard, IngestStats, IngestorStatus, ScanIngestor, SuppressionCache,
};
pub use storage::{ScanStore, SqliteScanStore};

/// Error type for scangate operations.
///
/// Format and duplicate rejections are not errors; they are classified
/// outcomes carried by [`ScanOutcome`]. This type covers the failures a
/// caller must handle differently.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A direct payload submission is empty
    /// - A configuration file cannot be read or parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The persistence collaborator could not complete an operation.
    ///
    /// Raised when:
    /// - The existence check or the insert fails (connectivity,
    ///   constraint violation)
    /// - A stored row cannot be decoded
    ///
    /// Callers must not treat this as "duplicate"; the attempt may be
    /// retried and will not be falsely suppressed by the cache.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The input-source runtime rejected a capability call.
    #[error("input source error: {0}")]
    InputSource(String),
}

/// Result type alias for scangate operations.
pub type Result<T> = std::result::Result<T, Error>;
