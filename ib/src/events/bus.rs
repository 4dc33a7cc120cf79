//! EventBus - central pub/sub for core activity
//!
//! Built on a tokio broadcast channel: emit is fire-and-forget, every
//! subscriber sees every event emitted after it subscribed. Dropping a
//! receiver removes the listener, which is how the intervention wait
//! avoids unbounded subscriber growth during long sessions.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{Event, LogLevel};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Outcome of waiting for a verification to resolve
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Resolved,
    Cancelled,
}

/// Central event bus
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers. No subscribers is fine; the event
    /// is dropped.
    pub fn emit(&self, event: Event) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Convenience: emit a log line
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(Event::log(level, message));
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Block until `verification_resolved` arrives for the given session,
    /// or the cancel token fires, whichever first. The subscription is
    /// created before returning control so a resolution emitted while we
    /// wait is never missed, and it is dropped on exit either way.
    pub async fn wait_for_resolution(&self, session_id: &str, cancel: &CancellationToken) -> WaitOutcome {
        let mut rx = self.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return WaitOutcome::Cancelled,
                event = rx.recv() => match event {
                    Ok(Event::VerificationResolved { session_id: sid }) if sid == session_id => {
                        return WaitOutcome::Resolved;
                    }
                    Ok(_) => continue,
                    // Lagged: we may have missed the resolution; keep waiting
                    // on subsequent events rather than failing the task.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return WaitOutcome::Cancelled,
                },
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
