//! Event types for the pickscan event system
//!
//! Provides the classification events published by a pick session and the
//! EventBus that carries them to the screen.

mod classification;

pub use classification::{BlockReason, ErrorKind};

use crate::models::{CommitJob, Product};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pick session event types
///
/// Every terminal outcome of the pipeline produces exactly one of these. The
/// screen owns the literal toast text and audio cue for each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PickEvent {
    /// A scan resolved to a product and the slot shows it
    ///
    /// Emitted with `optimistic = true` when a cached product is shown before
    /// the inventory confirms, and again with `optimistic = false` when the
    /// inventory result differs and corrects the slot in place.
    ScanResolved {
        code: String,
        product: Product,
        optimistic: bool,
        timestamp: DateTime<Utc>,
    },

    /// The active slot's case count changed
    SlotUpdated {
        code: String,
        case_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// The duplicate guard refused the code
    DuplicateBlocked {
        code: String,
        reason: BlockReason,
        is_already_fulfilled: bool,
        minutes_elapsed: i64,
        timestamp: DateTime<Utc>,
    },

    /// A pick was written to the inventory service
    Committed {
        job: CommitJob,
        timestamp: DateTime<Utc>,
    },

    /// A scan or commit ended in an error classification
    Error {
        kind: ErrorKind,
        code: Option<String>,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Voice asked to fulfill a code (handled by the fulfillment screen)
    FulfillRequested {
        code: String,
        timestamp: DateTime<Utc>,
    },

    /// Voice listener started, stopped or failed
    VoiceStatus {
        listening: bool,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PickEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PickEvent::ScanResolved { .. } => "ScanResolved",
            PickEvent::SlotUpdated { .. } => "SlotUpdated",
            PickEvent::DuplicateBlocked { .. } => "DuplicateBlocked",
            PickEvent::Committed { .. } => "Committed",
            PickEvent::Error { .. } => "Error",
            PickEvent::FulfillRequested { .. } => "FulfillRequested",
            PickEvent::VoiceStatus { .. } => "VoiceStatus",
        }
    }

    pub fn error(kind: ErrorKind, code: Option<&str>, message: impl Into<String>) -> Self {
        PickEvent::Error {
            kind,
            code: code.map(str::to_string),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Session event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the scan path)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use pickscan_common::events::{EventBus, ErrorKind, PickEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PickEvent::error(ErrorKind::NotFound, Some("100200300"), "unknown code"));
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "Error");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PickEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PickEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PickEvent,
    ) -> Result<usize, broadcast::error::SendError<PickEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PickEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrelationId, CommitJob};

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(PickEvent::error(ErrorKind::NotFound, None, "x"))
            .is_err());
        // emit_lossy must not panic
        bus.emit_lossy(PickEvent::error(ErrorKind::NotFound, None, "x"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(PickEvent::SlotUpdated {
            code: "100200300".to_string(),
            case_count: 1,
            timestamp: Utc::now(),
        });
        bus.emit_lossy(PickEvent::SlotUpdated {
            code: "100200300".to_string(),
            case_count: 2,
            timestamp: Utc::now(),
        });

        for expected in [1, 2] {
            match rx.recv().await.unwrap() {
                PickEvent::SlotUpdated { case_count, .. } => assert_eq!(case_count, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_committed_event_serializes_with_type_tag() {
        let job = CommitJob::new(
            "100200300",
            "Omega 3",
            2,
            12,
            CorrelationId {
                code: "100200300".to_string(),
                cycle: 1,
                cycle_started_at: Utc::now(),
            },
        );
        let event = PickEvent::Committed {
            job,
            timestamp: Utc::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Committed");
        assert_eq!(value["job"]["case_count"], 2);
        assert_eq!(value["job"]["status"], "pending");
    }
}
