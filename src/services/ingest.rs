//! Scan ingestion orchestrator.
//!
//! Wires the keystroke decoder (or a directly-submitted QR payload,
//! which skips decoding) through validation and the duplicate guard,
//! and re-exposes the observable outcomes on the event bus.

use crate::config::ScanConfig;
use crate::decoder::KeystrokeDecoder;
use crate::input::{InputSource, RegistrationHealth, register_required, required_symbols};
use crate::models::{EventMeta, ScanEvent, ScanOutcome, TagId};
use crate::observability::EventBus;
use crate::services::dedup::{DuplicateGuard, SuppressionCache};
use crate::storage::{ScanStore, acquire_lock};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

const EVENT_SOURCE: &str = "ingestor";

/// Cumulative ingestion counters.
#[derive(Debug, Default)]
struct Counters {
    total: u64,
    valid: u64,
    invalid: u64,
    duplicate: u64,
}

/// Snapshot of the cumulative ingestion statistics.
///
/// Advisory only; counters never gate behavior.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStats {
    /// Candidates decoded plus direct submissions.
    pub total_scans: u64,
    /// Scans accepted and persisted.
    pub valid_scans: u64,
    /// Candidates rejected by format validation.
    pub invalid_scans: u64,
    /// Payloads rejected as duplicates (cache or database).
    pub duplicate_scans: u64,
    /// Milliseconds since the ingestor was started.
    pub uptime_ms: u64,
    /// `valid_scans / total_scans`, 0 when idle.
    pub success_rate: f64,
}

/// Synchronous status and diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IngestorStatus {
    /// Whether keystroke events are currently being processed.
    pub listening: bool,
    /// Current keystroke buffer contents.
    pub buffer: String,
    /// Cumulative statistics.
    pub stats: IngestStats,
    /// Physical-source registration health.
    pub registration: RegistrationHealth,
}

/// Orchestrates the scan-ingestion pipeline.
///
/// Owns one decoder per physical reader source (events must arrive in
/// order), shares the suppression cache and guard across every ingestion
/// attempt, and publishes [`ScanEvent`]s on the bus passed at
/// construction.
pub struct ScanIngestor<S: ScanStore> {
    guard: DuplicateGuard<S>,
    decoder: Mutex<KeystrokeDecoder>,
    bus: EventBus,
    counters: Mutex<Counters>,
    started_at: Mutex<Option<Instant>>,
    listening: AtomicBool,
    health: Mutex<RegistrationHealth>,
    session_id: Mutex<String>,
    config: Mutex<ScanConfig>,
}

impl<S: ScanStore> ScanIngestor<S> {
    /// Creates an ingestor over the given store and event bus.
    #[must_use]
    pub fn new(config: ScanConfig, store: Arc<S>, bus: EventBus) -> Self {
        let cache = Arc::new(SuppressionCache::new(
            config.cache_capacity,
            config.min_scan_interval,
            config.cache_retention,
        ));
        let guard = DuplicateGuard::new(store, cache, config.min_scan_interval);

        Self {
            guard,
            decoder: Mutex::new(KeystrokeDecoder::from_config(&config)),
            bus,
            counters: Mutex::new(Counters::default()),
            started_at: Mutex::new(None),
            listening: AtomicBool::new(false),
            health: Mutex::new(RegistrationHealth {
                required: required_symbols().len(),
                bound: 0,
            }),
            session_id: Mutex::new(String::new()),
            config: Mutex::new(config),
        }
    }

    /// Returns the event bus for subscribing to pipeline notifications.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Starts listening: binds the required input symbols and marks the
    /// ingestor live for the given receiving session.
    ///
    /// Partial registration degrades (reported via [`status`]) but never
    /// aborts startup; direct QR submission keeps working even with no
    /// bound symbols.
    ///
    /// [`status`]: ScanIngestor::status
    pub fn start(&self, source: &mut dyn InputSource, session_id: impl Into<String>) {
        let health = register_required(source);
        *acquire_lock(&self.health) = health;
        *acquire_lock(&self.session_id) = session_id.into();
        *acquire_lock(&self.started_at) = Some(Instant::now());
        self.listening.store(true, Ordering::SeqCst);

        tracing::info!(
            bound = health.bound,
            required = health.required,
            "Scan ingestion started"
        );
        self.bus.publish(ScanEvent::Started {
            meta: EventMeta::new(EVENT_SOURCE),
            health,
        });
    }

    /// Stops listening and releases the bound input symbols.
    pub fn stop(&self, source: &mut dyn InputSource) {
        self.listening.store(false, Ordering::SeqCst);

        if let Err(err) = source.unregister_all() {
            tracing::warn!(error = %err, "Failed to release input symbols");
            self.bus.publish(ScanEvent::CallbackError {
                meta: EventMeta::new(EVENT_SOURCE),
                operation: "unregister_all".to_string(),
                error: err.to_string(),
            });
        }

        let mut health = acquire_lock(&self.health);
        health.bound = 0;
        drop(health);

        tracing::info!("Scan ingestion stopped");
        self.bus.publish(ScanEvent::Stopped {
            meta: EventMeta::new(EVENT_SOURCE),
        });
    }

    /// Returns true if keystroke events are currently processed.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Handles a single character event from the reader.
    ///
    /// Ignored while stopped. Never blocks on storage; only a terminator
    /// triggers downstream processing.
    pub fn handle_char(&self, c: char) {
        if !self.is_listening() {
            return;
        }
        acquire_lock(&self.decoder).handle_char(c, Instant::now());
    }

    /// Handles a terminator event from the reader.
    ///
    /// Flushes the buffer into a candidate and runs it through
    /// validation and the duplicate guard. Returns `None` when the
    /// buffer was empty (a bare terminator is a no-op).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if persistence failed; format and
    /// duplicate rejections are classified outcomes, not errors.
    pub async fn handle_terminator(&self) -> Result<Option<ScanOutcome>> {
        if !self.is_listening() {
            return Ok(None);
        }

        let candidate = acquire_lock(&self.decoder).flush();
        match candidate {
            None => Ok(None),
            Some(candidate) => self.process_candidate(candidate).await.map(Some),
        }
    }

    /// Submits a payload directly, bypassing keystroke decoding.
    ///
    /// Used for QR scans, whose content is not constrained to the RFID
    /// tag format; the payload goes straight to duplicate suppression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty payload and
    /// [`Error::Storage`] if persistence failed.
    #[instrument(skip(self), fields(operation = "submit_payload"))]
    pub async fn submit_payload(&self, payload: &str) -> Result<ScanOutcome> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(Error::InvalidInput("payload cannot be empty".to_string()));
        }

        acquire_lock(&self.counters).total += 1;
        metrics::counter!("scans_total", "path" => "direct").increment(1);
        self.admit(payload).await
    }

    /// Runs a decoded candidate through validation and the guard.
    async fn process_candidate(&self, candidate: String) -> Result<ScanOutcome> {
        acquire_lock(&self.counters).total += 1;
        metrics::counter!("scans_total", "path" => "decoded").increment(1);

        match TagId::parse(&candidate) {
            None => {
                acquire_lock(&self.counters).invalid += 1;
                metrics::counter!("scans_invalid_total").increment(1);
                tracing::warn!(candidate = %candidate, "Candidate failed tag validation");
                self.bus.publish(ScanEvent::TagInvalid {
                    meta: EventMeta::new(EVENT_SOURCE),
                    candidate: candidate.clone(),
                });
                Ok(ScanOutcome::Invalid { candidate })
            },
            Some(tag) => self.admit(tag.as_str()).await,
        }
    }

    /// Hands a payload to the duplicate guard and publishes the outcome.
    async fn admit(&self, payload: &str) -> Result<ScanOutcome> {
        let session_id = acquire_lock(&self.session_id).clone();

        match self.guard.try_save_scan(&session_id, payload).await {
            Ok(ScanOutcome::Accepted { record }) => {
                acquire_lock(&self.counters).valid += 1;
                self.bus.publish(ScanEvent::TagAccepted {
                    meta: EventMeta::new(EVENT_SOURCE),
                    record: record.clone(),
                });
                Ok(ScanOutcome::Accepted { record })
            },
            Ok(ScanOutcome::Duplicate { payload, source }) => {
                acquire_lock(&self.counters).duplicate += 1;
                self.bus.publish(ScanEvent::DuplicateScan {
                    meta: EventMeta::new(EVENT_SOURCE),
                    payload: payload.clone(),
                    source,
                });
                Ok(ScanOutcome::Duplicate { payload, source })
            },
            Ok(outcome @ ScanOutcome::Invalid { .. }) => Ok(outcome),
            Err(err) => {
                tracing::error!(error = %err, "Scan persistence failed");
                self.bus.publish(ScanEvent::CallbackError {
                    meta: EventMeta::new(EVENT_SOURCE),
                    operation: "try_save_scan".to_string(),
                    error: err.to_string(),
                });
                Err(err)
            },
        }
    }

    /// Clears the keystroke buffer manually and publishes the discarded
    /// content for observability.
    pub fn clear_buffer(&self) -> String {
        let discarded = acquire_lock(&self.decoder).clear();
        self.bus.publish(ScanEvent::BufferCleared {
            meta: EventMeta::new(EVENT_SOURCE),
            discarded: discarded.clone(),
        });
        discarded
    }

    /// Applies a new configuration to the running pipeline.
    ///
    /// Decoder bounds and the suppression window take effect for
    /// subsequent events; cache capacity and retention apply from
    /// construction and are unchanged here.
    pub fn update_config(&self, config: ScanConfig) {
        acquire_lock(&self.decoder).apply_config(&config);
        self.guard.set_min_scan_interval(config.min_scan_interval);
        *acquire_lock(&self.config) = config.clone();

        tracing::info!(
            min_scan_interval_ms = config.min_scan_interval.as_millis() as u64,
            "Configuration updated"
        );
        self.bus.publish(ScanEvent::ConfigChanged {
            meta: EventMeta::new(EVENT_SOURCE),
            config,
        });
    }

    /// Removes expired suppression cache entries; returns how many.
    pub fn cleanup_cache(&self) -> usize {
        self.guard.cleanup_cache()
    }

    /// Returns the status and diagnostics snapshot.
    #[must_use]
    pub fn status(&self) -> IngestorStatus {
        let counters = acquire_lock(&self.counters);
        let started_at = *acquire_lock(&self.started_at);
        let uptime_ms = started_at
            .map_or(0, |at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX));
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if counters.total == 0 {
            0.0
        } else {
            counters.valid as f64 / counters.total as f64
        };

        IngestorStatus {
            listening: self.is_listening(),
            buffer: acquire_lock(&self.decoder).buffer().to_string(),
            stats: IngestStats {
                total_scans: counters.total,
                valid_scans: counters.valid,
                invalid_scans: counters.invalid,
                duplicate_scans: counters.duplicate,
                uptime_ms,
                success_rate,
            },
            registration: *acquire_lock(&self.health),
        }
    }

    /// Resets the cumulative counters to zero.
    ///
    /// Only this explicit call resets them; no implicit resets happen.
    pub fn reset_stats(&self) {
        *acquire_lock(&self.counters) = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::UnmanagedSource;
    use crate::models::DuplicateSource;
    use crate::storage::SqliteScanStore;
    use std::time::Duration;

    fn ingestor() -> ScanIngestor<SqliteScanStore> {
        let store = Arc::new(SqliteScanStore::in_memory().unwrap());
        ScanIngestor::new(ScanConfig::default(), store, EventBus::new(64))
    }

    fn started() -> ScanIngestor<SqliteScanStore> {
        let ingestor = ingestor();
        ingestor.start(&mut UnmanagedSource, "sess-1");
        ingestor
    }

    async fn scan(ingestor: &ScanIngestor<SqliteScanStore>, tag: &str) -> Option<ScanOutcome> {
        for c in tag.chars() {
            ingestor.handle_char(c);
        }
        ingestor.handle_terminator().await.unwrap()
    }

    #[tokio::test]
    async fn decoded_tag_is_accepted_and_counted() {
        let ingestor = started();
        let outcome = scan(&ingestor, "53004114").await.unwrap();
        assert!(outcome.is_accepted());

        let status = ingestor.status();
        assert_eq!(status.stats.total_scans, 1);
        assert_eq!(status.stats.valid_scans, 1);
        assert!((status.stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn invalid_candidate_is_classified_not_errored() {
        let ingestor = started();
        let outcome = scan(&ingestor, "GG1234").await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Invalid { ref candidate } if candidate == "GG1234"));

        let status = ingestor.status();
        assert_eq!(status.stats.invalid_scans, 1);
        assert_eq!(status.stats.valid_scans, 0);
    }

    #[tokio::test]
    async fn bare_terminator_is_noop() {
        let ingestor = started();
        assert!(ingestor.handle_terminator().await.unwrap().is_none());
        assert_eq!(ingestor.status().stats.total_scans, 0);
    }

    #[tokio::test]
    async fn characters_ignored_while_stopped() {
        let ingestor = ingestor();
        ingestor.handle_char('5');
        assert_eq!(ingestor.status().buffer, "");
        assert!(ingestor.handle_terminator().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_scan_counted_and_published() {
        let ingestor = started();
        let mut events = ingestor.bus().subscribe_event_type("duplicate-scan");

        scan(&ingestor, "53004114").await.unwrap();
        let outcome = scan(&ingestor, "53004114").await.unwrap();
        assert!(matches!(
            outcome,
            ScanOutcome::Duplicate {
                source: DuplicateSource::Cache,
                ..
            }
        ));

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type(), "duplicate-scan");
        assert_eq!(ingestor.status().stats.duplicate_scans, 1);
    }

    #[tokio::test]
    async fn qr_payload_skips_tag_validation() {
        let ingestor = started();
        // Not a valid hex tag, but QR content is free-form.
        let outcome = ingestor
            .submit_payload("ORDER-2024-00042")
            .await
            .unwrap();
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn empty_direct_payload_is_invalid_input() {
        let ingestor = started();
        let result = ingestor.submit_payload("   ").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn clear_buffer_publishes_discarded_content() {
        let ingestor = started();
        let mut events = ingestor.bus().subscribe_event_type("buffer-cleared");

        ingestor.handle_char('5');
        ingestor.handle_char('3');
        assert_eq!(ingestor.clear_buffer(), "53");
        assert_eq!(ingestor.status().buffer, "");

        match events.recv().await.unwrap() {
            ScanEvent::BufferCleared { discarded, .. } => assert_eq!(discarded, "53"),
            other => panic!("unexpected event {}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn start_and_stop_publish_lifecycle_events() {
        let ingestor = ingestor();
        let mut events = ingestor.bus().subscribe();

        let mut source = UnmanagedSource;
        ingestor.start(&mut source, "sess-1");
        assert!(ingestor.is_listening());
        assert_eq!(events.recv().await.unwrap().event_type(), "started");

        ingestor.stop(&mut source);
        assert!(!ingestor.is_listening());
        assert_eq!(events.recv().await.unwrap().event_type(), "stopped");
        assert_eq!(ingestor.status().registration.bound, 0);
    }

    #[tokio::test]
    async fn update_config_publishes_and_applies() {
        let ingestor = started();
        let mut events = ingestor.bus().subscribe_event_type("config-changed");

        let config = ScanConfig::default().with_min_scan_interval(Duration::from_millis(200));
        ingestor.update_config(config);
        assert_eq!(events.recv().await.unwrap().event_type(), "config-changed");

        // Window now 200ms: a re-scan after 250ms is accepted again.
        ingestor.submit_payload("53004114").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let outcome = ingestor.submit_payload("53004114").await.unwrap();
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn reset_stats_zeroes_counters() {
        let ingestor = started();
        scan(&ingestor, "53004114").await.unwrap();
        assert_eq!(ingestor.status().stats.total_scans, 1);

        ingestor.reset_stats();
        let stats = ingestor.status().stats;
        assert_eq!(stats.total_scans, 0);
        assert_eq!(stats.valid_scans, 0);
    }
}
