//! Task queue manager: named queues, worker leasing, retry, dead-lettering.
//!
//! No scheduler thread exists: progress happens only when callers poll
//! `get_next_task`. A queue with no active pollers makes no progress even
//! past a task's computed retry delay. Leasing is a single atomic claim in
//! the repository, so at most one worker holds a task regardless of how many
//! callers poll concurrently.

use std::sync::Arc;

use conductor_types::config::RetryPolicy;
use conductor_types::queue::{QueueStats, QueueTask, TaskQueue, TaskStatus};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::repository::queue::QueueRepository;
use crate::service::clock::Clock;

use super::backoff::retry_delay;

// ---------------------------------------------------------------------------
// TaskQueueManager
// ---------------------------------------------------------------------------

/// Distributes discrete work items to polling workers.
///
/// Owns an injected repository handle; no hidden module-level state. The
/// depth gauge is an in-process metrics cache, refreshed on the producer and
/// consumer paths.
pub struct TaskQueueManager<Q: QueueRepository> {
    repo: Q,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    depth_gauge: DashMap<String, u64>,
}

impl<Q: QueueRepository> TaskQueueManager<Q> {
    /// Create a manager over the given repository with a retry policy.
    pub fn new(repo: Q, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            policy,
            clock,
            depth_gauge: DashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    /// Create a named queue.
    pub async fn create_queue(
        &self,
        name: &str,
        max_concurrent: u32,
        priority: i32,
    ) -> Result<TaskQueue, QueueError> {
        let queue = TaskQueue {
            id: Uuid::now_v7(),
            name: name.to_string(),
            max_concurrent,
            priority,
            is_active: true,
            created_at: self.clock.now(),
        };

        self.repo.create_queue(&queue).await.map_err(|e| match e {
            conductor_types::error::RepositoryError::Conflict(_) => {
                QueueError::NameConflict(name.to_string())
            }
            other => QueueError::Repository(other.to_string()),
        })?;

        tracing::info!(
            queue = name,
            max_concurrent,
            priority,
            "queue created"
        );
        Ok(queue)
    }

    /// Observed depth (pending + queued) for a queue, from the last refresh.
    pub fn observed_depth(&self, queue_name: &str) -> Option<u64> {
        self.depth_gauge.get(queue_name).map(|d| *d)
    }

    // -----------------------------------------------------------------------
    // Producer path
    // -----------------------------------------------------------------------

    /// Add a task to an active queue.
    pub async fn add_task(
        &self,
        queue_name: &str,
        task_type: &str,
        task_data: Value,
        priority: i32,
        max_retries: u32,
    ) -> Result<QueueTask, QueueError> {
        let queue = self.active_queue(queue_name).await?;
        let now = self.clock.now();

        let task = QueueTask {
            id: Uuid::now_v7(),
            queue_id: queue.id,
            task_type: task_type.to_string(),
            task_data,
            status: TaskStatus::Pending,
            priority,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            assigned_worker: None,
            result_data: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        self.repo
            .create_task(&task)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;

        let depth = self.refresh_depth(&queue).await;
        tracing::debug!(
            queue = queue_name,
            task_id = %task.id,
            task_type,
            priority,
            depth,
            "task enqueued"
        );

        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Worker path
    // -----------------------------------------------------------------------

    /// Lease the next eligible task for a worker.
    ///
    /// Returns `None` when nothing is eligible or the queue is at its
    /// `max_concurrent` processing limit (backpressure). The claim is
    /// exclusive: no two workers can lease the same task.
    pub async fn get_next_task(
        &self,
        queue_name: &str,
        worker_id: &str,
    ) -> Result<Option<QueueTask>, QueueError> {
        let queue = self.active_queue(queue_name).await?;
        let now = self.clock.now();

        let claimed = self
            .repo
            .claim_next_task(&queue.id, queue.max_concurrent, worker_id, now)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;

        if let Some(task) = &claimed {
            let depth = self.refresh_depth(&queue).await;
            tracing::debug!(
                queue = queue_name,
                task_id = %task.id,
                worker = worker_id,
                depth,
                "task leased"
            );
        }

        Ok(claimed)
    }

    /// Mark a leased task as completed.
    pub async fn complete_task(
        &self,
        task_id: Uuid,
        result_data: Option<Value>,
    ) -> Result<QueueTask, QueueError> {
        let mut task = self.require_task(task_id).await?;
        let now = self.clock.now();

        let duration_ms = task
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0));

        task.status = TaskStatus::Completed;
        task.result_data = result_data;
        task.assigned_worker = None;
        task.completed_at = Some(now);
        task.updated_at = now;

        self.repo
            .update_task(&task)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;

        tracing::info!(
            task_id = %task.id,
            duration_ms = duration_ms.unwrap_or(0),
            "task completed"
        );
        Ok(task)
    }

    /// Record a failed attempt.
    ///
    /// With `retry` and budget remaining, the task is re-queued with an
    /// exponential backoff delay; otherwise it is dead-lettered permanently.
    /// Always succeeds in recording the failure for a valid task ID.
    pub async fn fail_task(
        &self,
        task_id: Uuid,
        error: &str,
        retry: bool,
    ) -> Result<QueueTask, QueueError> {
        let mut task = self.require_task(task_id).await?;
        let now = self.clock.now();

        task.retry_count += 1;
        task.error_message = Some(error.to_string());
        task.assigned_worker = None;
        task.updated_at = now;

        if retry && task.retry_count <= task.max_retries {
            let delay = retry_delay(&self.policy, task.retry_count);
            task.status = TaskStatus::Queued;
            task.next_retry_at = Some(now + delay);

            tracing::warn!(
                task_id = %task.id,
                retry_count = task.retry_count,
                max_retries = task.max_retries,
                delay_secs = delay.num_seconds(),
                error,
                "task failed, retry scheduled"
            );
        } else {
            task.status = TaskStatus::Failed;
            task.next_retry_at = None;
            task.completed_at = Some(now);

            tracing::error!(
                task_id = %task.id,
                retry_count = task.retry_count,
                error,
                "task failed permanently (dead letter)"
            );
        }

        self.repo
            .update_task(&task)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;
        Ok(task)
    }

    /// Cancel a task. Terminal and irreversible; cancelling an
    /// already-terminal task is a no-op.
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<QueueTask, QueueError> {
        let mut task = self.require_task(task_id).await?;
        if task.status.is_terminal() {
            tracing::warn!(task_id = %task.id, status = ?task.status, "cancel of terminal task ignored");
            return Ok(task);
        }

        let now = self.clock.now();
        task.status = TaskStatus::Cancelled;
        task.assigned_worker = None;
        task.next_retry_at = None;
        task.completed_at = Some(now);
        task.updated_at = now;

        self.repo
            .update_task(&task)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;

        tracing::info!(task_id = %task.id, "task cancelled");
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    /// Per-status counters for a queue.
    pub async fn get_queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError> {
        let queue = self.queue(queue_name).await?;
        let stats = self
            .repo
            .queue_stats(&queue.id)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?;
        self.depth_gauge.insert(queue.name.clone(), stats.depth());
        Ok(stats)
    }

    /// Permanently failed tasks for manual remediation.
    pub async fn get_failed_tasks(
        &self,
        queue_name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<QueueTask>, QueueError> {
        let queue_id = match queue_name {
            Some(name) => Some(self.queue(name).await?.id),
            None => None,
        };

        self.repo
            .list_failed_tasks(queue_id.as_ref(), limit)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn queue(&self, name: &str) -> Result<TaskQueue, QueueError> {
        self.repo
            .get_queue_by_name(name)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    async fn active_queue(&self, name: &str) -> Result<TaskQueue, QueueError> {
        let queue = self.queue(name).await?;
        if !queue.is_active {
            return Err(QueueError::QueueInactive(name.to_string()));
        }
        Ok(queue)
    }

    async fn require_task(&self, task_id: Uuid) -> Result<QueueTask, QueueError> {
        self.repo
            .get_task(&task_id)
            .await
            .map_err(|e| QueueError::Repository(e.to_string()))?
            .ok_or(QueueError::TaskNotFound(task_id))
    }

    /// Refresh the in-process depth gauge for a queue. Gauge failures never
    /// affect the calling operation.
    async fn refresh_depth(&self, queue: &TaskQueue) -> u64 {
        match self.repo.queue_stats(&queue.id).await {
            Ok(stats) => {
                let depth = stats.depth();
                self.depth_gauge.insert(queue.name.clone(), depth);
                depth
            }
            Err(e) => {
                tracing::debug!(queue = queue.name.as_str(), error = %e, "depth refresh failed");
                self.observed_depth(&queue.name).unwrap_or(0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Queue name does not exist.
    #[error("queue not found: '{0}'")]
    QueueNotFound(String),

    /// Queue exists but is deactivated.
    #[error("queue '{0}' is not active")]
    QueueInactive(String),

    /// Queue name is already taken.
    #[error("queue '{0}' already exists")]
    NameConflict(String),

    /// Task ID does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Underlying repository operation failed.
    #[error("queue repository error: {0}")]
    Repository(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
