//! Business logic services.
//!
//! Services compose the decoder, duplicate suppression and storage into
//! the observable ingestion pipeline.

pub mod dedup;
mod ingest;

pub use dedup::{CacheDecision, DuplicateGuard, PayloadLocks, SuppressionCache};
pub use ingest::{IngestStats, IngestorStatus, ScanIngestor};
