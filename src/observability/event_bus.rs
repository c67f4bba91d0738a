//! Tokio broadcast event bus for pipeline notifications.

use crate::models::ScanEvent;
use tokio::sync::broadcast;

/// Central event bus for broadcasting scan events.
///
/// Constructed by the host and passed to the orchestrator; there is no
/// ambient process-global bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<ScanEvent>,
    predicate: F,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    pub fn publish(&self, event: ScanEvent) {
        metrics::counter!("scan_event_publish_total", "event" => event.event_type()).increment(1);
        metrics::gauge!("scan_event_receivers").set(self.sender.receiver_count() as f64);
        if self.sender.send(event).is_err() {
            // No live subscribers; events are advisory.
            metrics::counter!("scan_event_publish_dropped_total").increment(1);
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Subscribes with a predicate to filter events.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, predicate: F) -> FilteredReceiver<F>
    where
        F: Fn(&ScanEvent) -> bool,
    {
        FilteredReceiver {
            receiver: self.sender.subscribe(),
            predicate,
        }
    }

    /// Subscribes to events matching the provided event type.
    #[must_use]
    pub fn subscribe_event_type(
        &self,
        event_type: &'static str,
    ) -> FilteredReceiver<impl Fn(&ScanEvent) -> bool> {
        self.subscribe_filtered(move |event| event.event_type() == event_type)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ScanEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed.
    pub async fn recv(&mut self) -> Result<ScanEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.predicate)(&event) {
                        return Ok(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("scan_event_lagged_total").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}
