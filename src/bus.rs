//! C2 Event Bus — topic-based pub/sub over the task and reviewer lifecycle,
//! built on `tokio::sync::broadcast` so every subscriber gets an
//! independent, non-blocking view of the stream.
use crate::models::{IncidentKind, Presence};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event this service emits. A slow subscriber is lagged and drops
/// events rather than blocking a publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum DispatchEvent {
    TaskEnqueued {
        task_id: String,
    },
    TaskAssigned {
        task_id: String,
        reviewer_id: String,
        deadline_at: chrono::DateTime<chrono::Utc>,
    },
    TaskStarted {
        task_id: String,
        reviewer_id: String,
    },
    TaskCompleted {
        task_id: String,
        reviewer_id: String,
        new_resume_url: String,
        completion_seconds: f64,
    },
    TaskFailed {
        task_id: String,
        reviewer_id: String,
        reason: String,
    },
    TaskRequeued {
        task_id: String,
        retry_count: u32,
        reason: String,
    },
    /// Abandoned after exceeding the retry cap.
    TaskTimeout {
        task_id: String,
    },
    TaskWarning {
        task_id: String,
        reviewer_id: String,
        minutes_remaining: i64,
    },
    ReviewerPresence {
        reviewer_id: String,
        presence: Presence,
    },
    ReviewerStrike {
        reviewer_id: String,
        kind: IncidentKind,
        warnings: u8,
        violations: u8,
    },
    ReviewerSuspended {
        reviewer_id: String,
    },
}

/// Thin wrapper over `tokio::sync::broadcast` with one channel for the
/// whole process. Every subscriber gets an independent receiver.
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(crate::constants::EVENT_BUS_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Non-blocking from the publisher's perspective: if
    /// there are no subscribers this is a no-op, and a lagging subscriber
    /// never backpressures the sender.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
