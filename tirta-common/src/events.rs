//! Event types and broadcast bus for the Tirta services
//!
//! The ingest service emits retrain lifecycle events on a broadcast channel;
//! the SSE endpoint and any in-process observers subscribe to it. Events are
//! fire-and-forget: a full channel drops the oldest event rather than
//! blocking the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Retrain workflow state
///
/// One retrain invocation progresses:
/// Idle → Uploading → Validating → Training → Saving → Completed,
/// with Error reachable from Validating (bad stored data) or Training
/// (timeout / remote failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrainState {
    /// Upload registered, no training attempt made yet
    Idle,
    /// Loading the stored upload artifact
    Uploading,
    /// Re-normalizing and validating the stored rows
    Validating,
    /// Remote training call in flight
    Training,
    /// Persisting the forecast artifact and registry updates
    Saving,
    /// Retrain finished successfully
    Completed,
    /// Retrain failed
    Error,
}

impl RetrainState {
    /// True for states no further transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetrainState::Completed | RetrainState::Error)
    }
}

/// Severity of a retrain log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Tirta event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TirtaEvent {
    /// A historical upload was accepted into the registry
    UploadAccepted {
        upload_id: Uuid,
        row_count: usize,
        data_type: String,
        timestamp: DateTime<Utc>,
    },

    /// A retrain invocation started
    RetrainStarted {
        session_id: Uuid,
        upload_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Retrain session moved to a new state
    RetrainStateChanged {
        session_id: Uuid,
        upload_id: Uuid,
        state: RetrainState,
        timestamp: DateTime<Utc>,
    },

    /// A line was appended to a retrain session's log
    RetrainLog {
        session_id: Uuid,
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Retrain finished and a new forecast artifact is current
    RetrainCompleted {
        session_id: Uuid,
        upload_id: Uuid,
        training_time_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Retrain failed
    RetrainFailed {
        session_id: Uuid,
        upload_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The current forecast artifact was cleared
    ForecastCleared {
        timestamp: DateTime<Utc>,
    },
}

impl TirtaEvent {
    /// Event name used as the SSE event type
    pub fn event_type(&self) -> &str {
        match self {
            TirtaEvent::UploadAccepted { .. } => "UploadAccepted",
            TirtaEvent::RetrainStarted { .. } => "RetrainStarted",
            TirtaEvent::RetrainStateChanged { .. } => "RetrainStateChanged",
            TirtaEvent::RetrainLog { .. } => "RetrainLog",
            TirtaEvent::RetrainCompleted { .. } => "RetrainCompleted",
            TirtaEvent::RetrainFailed { .. } => "RetrainFailed",
            TirtaEvent::ForecastCleared { .. } => "ForecastCleared",
        }
    }
}

/// Broadcast event bus
///
/// Cheap to clone; all clones share the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TirtaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TirtaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Progress events are advisory; nothing in the pipeline depends on a
    /// listener being attached.
    pub fn emit_lossy(&self, event: TirtaEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("Event dropped (no subscribers): {}", e);
        }
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(TirtaEvent::ForecastCleared {
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "ForecastCleared");
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_lossy(TirtaEvent::ForecastCleared {
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn terminal_states() {
        assert!(RetrainState::Completed.is_terminal());
        assert!(RetrainState::Error.is_terminal());
        assert!(!RetrainState::Training.is_terminal());
        assert!(!RetrainState::Idle.is_terminal());
    }
}
