//! # Task Dispatch & SLA Enforcement Core
//!
//! Dispatches human-review tasks produced by an upstream ATS-scoring step
//! to available reviewers, enforces a per-task completion deadline, and
//! runs a strike machine against reviewers who let tasks expire.
//!
//! ## Architecture
//!
//! - **Task Store**: the linearization point for every task and reviewer
//!   state transition.
//! - **Event Bus**: topic-based pub/sub over the task and reviewer
//!   lifecycle, consumed by the background loops and the `/events`
//!   WebSocket.
//! - **Intake API**: the write path ahead of the store — `enqueue_task`,
//!   `ingest_score`, `presence_set`.
//! - **Assigner**: a tick loop that keeps the queue draining while
//!   eligible reviewers exist.
//! - **Deadline Monitor**: a sweep loop that expires overdue tasks
//!   through the strike machine and emits pre-warnings.
//! - **Reviewer Gateway**: ownership-checked `start`/`complete`/`fail`
//!   forwarding for a connected reviewer.
//! - **HTTP/WebSocket API**: the transport binding all of the above to
//!   the outside world.

/// HTTP/WebSocket API server and endpoints
pub mod api;
/// C4 Assigner background loop
pub mod assigner;
/// Authentication and authorization
pub mod auth;
/// C2 Event Bus
pub mod bus;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// C5 Deadline Monitor + C6 Pre-warning Emitter
pub mod deadline_monitor;
/// Error types and handling
pub mod error;
/// C7 Reviewer Gateway
pub mod gateway;
/// C3 Intake API
pub mod intake;
/// Core data models
pub mod models;
/// System monitoring and status reporting
pub mod monitoring;
/// Rate limiting functionality
pub mod rate_limit;
/// Security utilities and API key management
pub mod security;
/// C1 Task Store
pub mod store;
/// Input validation and sanitization
pub mod validation;

#[cfg(test)]
mod tests;

pub use error::{DispatchError, Result};
