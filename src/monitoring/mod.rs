//! System health and status reporting: queue depth, reviewer roster, and
//! process uptime, exposed for operational tooling alongside `/health`.
use crate::bus::EventBus;
use crate::store::TaskStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Overall system health, derived from queue backlog and suspended reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Snapshot returned by `GET /system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub uptime_seconds: f64,
    pub health_status: HealthStatus,
    pub queued_tasks: usize,
    pub assigned_tasks: usize,
    pub in_progress_tasks: usize,
    pub total_reviewers: usize,
    pub available_reviewers: usize,
    pub suspended_reviewers: usize,
    pub event_subscribers: usize,
}

/// Centralized status reporting; holds only a start time plus shared
/// handles to the store and bus it reports on.
pub struct SystemMonitor {
    store: Arc<TaskStore>,
    bus: Arc<EventBus>,
    start_time: Instant,
}

impl SystemMonitor {
    pub fn new(store: Arc<TaskStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            start_time: Instant::now(),
        }
    }

    pub async fn status(&self) -> SystemStatus {
        let (queued, assigned, in_progress) = self.store.task_counts_by_status().await;
        let (total_reviewers, available_reviewers, suspended_reviewers) =
            self.store.reviewer_counts().await;

        let health_status = if suspended_reviewers > 0 && available_reviewers == 0 {
            HealthStatus::Degraded
        } else if queued > crate::constants::MAX_QUEUE_SIZE / 2 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        SystemStatus {
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
            health_status,
            queued_tasks: queued,
            assigned_tasks: assigned,
            in_progress_tasks: in_progress,
            total_reviewers,
            available_reviewers,
            suspended_reviewers,
            event_subscribers: self.subscriber_count(),
        }
    }

    /// Number of active subscribers on the event bus, surfaced on
    /// `SystemStatus` so operators can see whether anything is watching.
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
