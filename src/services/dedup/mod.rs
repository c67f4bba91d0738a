//! Duplicate suppression.
//!
//! Two-tier defense against repeated reads of the same payload:
//!
//! 1. **Suppression cache**: in-process, time-bounded map rejecting
//!    immediate re-reads without storage I/O.
//! 2. **Persistent guard**: per-payload serialization plus an
//!    authoritative storage check, so concurrent submissions and
//!    cross-process repeats resolve to exactly one accepted record.
//!
//! The cache may miss (it is not persisted across restarts); the guard
//! is the authority of record.

mod cache;
mod guard;
mod locks;

pub use cache::{CacheDecision, SuppressionCache};
pub use guard::DuplicateGuard;
pub use locks::{PayloadGuard, PayloadLocks};
