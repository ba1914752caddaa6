//! Event types for the sttag event system
//!
//! Progress and run lifecycle events are broadcast over an [`EventBus`] so that
//! any number of observers (console printer, SSE stream, tests) can follow a run
//! without the batch engine knowing about them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Named cache operations exposed by the façade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    /// Look up missing covers remotely and store them in the cover folder
    Populate,
    /// Embed cached covers into the audio files
    Apply,
}

impl std::fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOperation::Populate => write!(f, "populate"),
            CacheOperation::Apply => write!(f, "apply"),
        }
    }
}

/// sttag event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaggerEvent {
    /// A batch run began
    RunStarted {
        run_id: Uuid,
        operation: CacheOperation,
        /// Number of enumerated work items
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress counters changed
    ///
    /// Emitted after every counter mutation. Delivery is best-effort: slow
    /// subscribers may miss intermediate values.
    ProgressChanged {
        total: usize,
        completed: usize,
        succeeded: usize,
        /// `(Tagged files : S) C/T`
        steps_text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch run finished (possibly with per-item failures)
    RunCompleted {
        run_id: Uuid,
        operation: CacheOperation,
        total: usize,
        completed: usize,
        succeeded: usize,
        /// Paths of the items that failed
        failed_paths: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A batch run stopped early on cancellation
    RunCancelled {
        run_id: Uuid,
        operation: CacheOperation,
        completed: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TaggerEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TaggerEvent::RunStarted { .. } => "RunStarted",
            TaggerEvent::ProgressChanged { .. } => "ProgressChanged",
            TaggerEvent::RunCompleted { .. } => "RunCompleted",
            TaggerEvent::RunCancelled { .. } => "RunCancelled",
        }
    }
}

/// Broadcast bus for [`TaggerEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaggerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TaggerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TaggerEvent,
    ) -> Result<usize, broadcast::error::SendError<TaggerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TaggerEvent) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(TaggerEvent::ProgressChanged {
            total: 1,
            completed: 0,
            succeeded: 0,
            steps_text: "(Tagged files : 0) 0/1".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let run_id = Uuid::new_v4();
        bus.emit_lossy(TaggerEvent::RunStarted {
            run_id,
            operation: CacheOperation::Apply,
            total: 3,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            TaggerEvent::RunStarted { run_id: got, total, .. } => {
                assert_eq!(got, run_id);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TaggerEvent::RunCancelled {
            run_id: Uuid::nil(),
            operation: CacheOperation::Populate,
            completed: 2,
            total: 5,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RunCancelled");
        assert_eq!(json["operation"], "populate");
        assert_eq!(event.event_type(), "RunCancelled");
    }
}
