//! Task queue types.
//!
//! Queues distribute discrete work items to polling workers. A task is leased
//! exclusively by one worker per attempt, retried with exponential backoff,
//! and parked as a dead letter once its retry budget is spent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

/// A named queue with its own concurrency limit and priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueue {
    /// UUIDv7 queue ID.
    pub id: Uuid,
    /// Unique queue name (e.g. "codegen", "notifications").
    pub name: String,
    /// Maximum number of tasks this queue allows in `Processing` at once.
    pub max_concurrent: u32,
    /// Queue priority, used for display/ordering across queues.
    pub priority: i32,
    /// Inactive queues reject new tasks and lease nothing.
    pub is_active: bool,
    /// When the queue was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// QueueTask
// ---------------------------------------------------------------------------

/// Status of a queue task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Freshly added, never attempted.
    Pending,
    /// Re-queued after a failed attempt; eligible once `next_retry_at` passes.
    Queued,
    /// Leased by a worker.
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// A discrete work item distributed through a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    /// UUIDv7 task ID.
    pub id: Uuid,
    /// The queue this task belongs to.
    pub queue_id: Uuid,
    /// Worker-dispatched task type (e.g. "render-report").
    pub task_type: String,
    /// Opaque task payload handed to the worker.
    pub task_data: serde_json::Value,
    /// Current task status.
    pub status: TaskStatus,
    /// Higher values are leased first.
    pub priority: i32,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Retry budget before the task is dead-lettered.
    pub max_retries: u32,
    /// Earliest time a `Queued` task becomes eligible again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Worker currently holding the lease (only while `Processing`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    /// Result payload recorded on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<serde_json::Value>,
    /// Error message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the task was added.
    pub created_at: DateTime<Utc>,
    /// When the task was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the current (or last) lease began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// QueueStats
// ---------------------------------------------------------------------------

/// Per-queue observability counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name these counters describe.
    pub queue_name: String,
    pub pending: u64,
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueueStats {
    /// Tasks waiting to be leased (fresh or awaiting retry).
    pub fn depth(&self) -> u64 {
        self.pending + self.queued
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
