//! Ingestion event types for the notification surface.

use super::{DuplicateSource, ScanRecord};
use crate::config::ScanConfig;
use crate::input::RegistrationHealth;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Event source component.
    pub source: &'static str,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    /// Creates new event metadata stamped with the current time.
    #[must_use]
    pub fn new(source: &'static str) -> Self {
        Self::with_timestamp(source, Utc::now())
    }

    /// Creates new event metadata with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(source: &'static str, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            source,
            timestamp,
        }
    }
}

/// Events emitted by the ingestion pipeline.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Ingestion started; carries the input registration health.
    Started {
        /// Event metadata.
        meta: EventMeta,
        /// How many required input symbols could be bound.
        health: RegistrationHealth,
    },
    /// Ingestion stopped.
    Stopped {
        /// Event metadata.
        meta: EventMeta,
    },
    /// A tag was accepted and persisted.
    TagAccepted {
        /// Event metadata.
        meta: EventMeta,
        /// The newly created record.
        record: ScanRecord,
    },
    /// A decoded candidate failed format validation.
    TagInvalid {
        /// Event metadata.
        meta: EventMeta,
        /// The rejected candidate.
        candidate: String,
    },
    /// A payload was rejected as a duplicate.
    DuplicateScan {
        /// Event metadata.
        meta: EventMeta,
        /// The rejected payload.
        payload: String,
        /// Which layer detected the duplicate.
        source: DuplicateSource,
    },
    /// The keystroke buffer was cleared manually.
    BufferCleared {
        /// Event metadata.
        meta: EventMeta,
        /// The discarded buffer content (may be empty).
        discarded: String,
    },
    /// The runtime configuration changed.
    ConfigChanged {
        /// Event metadata.
        meta: EventMeta,
        /// The configuration now in effect.
        config: ScanConfig,
    },
    /// A downstream operation failed while handling a scan.
    CallbackError {
        /// Event metadata.
        meta: EventMeta,
        /// The operation that failed.
        operation: String,
        /// The error message.
        error: String,
    },
}

impl ScanEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Stopped { .. } => "stopped",
            Self::TagAccepted { .. } => "tag",
            Self::TagInvalid { .. } => "invalid-tag",
            Self::DuplicateScan { .. } => "duplicate-scan",
            Self::BufferCleared { .. } => "buffer-cleared",
            Self::ConfigChanged { .. } => "config-changed",
            Self::CallbackError { .. } => "callback-error",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::Started { meta, .. }
            | Self::Stopped { meta }
            | Self::TagAccepted { meta, .. }
            | Self::TagInvalid { meta, .. }
            | Self::DuplicateScan { meta, .. }
            | Self::BufferCleared { meta, .. }
            | Self::ConfigChanged { meta, .. }
            | Self::CallbackError { meta, .. } => meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_match_notification_surface() {
        let meta = EventMeta::new("test");
        let event = ScanEvent::TagInvalid {
            meta,
            candidate: "GG".to_string(),
        };
        assert_eq!(event.event_type(), "invalid-tag");
        assert_eq!(event.meta().source, "test");
    }

    #[test]
    fn meta_ids_are_unique() {
        let a = EventMeta::new("test");
        let b = EventMeta::new("test");
        assert_ne!(a.event_id, b.event_id);
    }
}
