//! Queue repository trait definition.
//!
//! The claim operation is the heart of worker leasing: select the eligible
//! task with the highest priority (oldest first on ties) and mark it
//! `Processing` in a single atomic step, so no two concurrent pollers can
//! lease the same task. The admission-control guard (processing count below
//! the queue's `max_concurrent`) is part of the same atomic claim.

use chrono::{DateTime, Utc};
use conductor_types::error::RepositoryError;
use conductor_types::queue::{QueueStats, QueueTask, TaskQueue};
use uuid::Uuid;

/// Repository trait for queue and queue-task persistence.
pub trait QueueRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    /// Insert a new queue. Fails with `Conflict` when the name is taken.
    fn create_queue(
        &self,
        queue: &TaskQueue,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a queue by its unique name.
    fn get_queue_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<TaskQueue>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Insert a new queue task.
    fn create_task(
        &self,
        task: &QueueTask,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a task by its UUID.
    fn get_task(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<QueueTask>, RepositoryError>> + Send;

    /// Replace a task row by ID.
    fn update_task(
        &self,
        task: &QueueTask,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically lease the next eligible task for a worker.
    ///
    /// Eligible: status `Pending`, or `Queued` with `next_retry_at <= now`.
    /// Ordering: priority DESC, then created_at ASC. The claim only succeeds
    /// while the queue's `Processing` count is below `max_concurrent`; the
    /// selected task is transitioned to `Processing` with `assigned_worker`
    /// and `started_at` set, all in one atomic operation.
    fn claim_next_task(
        &self,
        queue_id: &Uuid,
        max_concurrent: u32,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<QueueTask>, RepositoryError>> + Send;

    /// Number of tasks currently `Processing` in a queue.
    fn count_processing(
        &self,
        queue_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Per-status task counts for a queue.
    fn queue_stats(
        &self,
        queue_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<QueueStats, RepositoryError>> + Send;

    /// Permanently failed tasks, optionally scoped to one queue, newest first.
    fn list_failed_tasks(
        &self,
        queue_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<QueueTask>, RepositoryError>> + Send;
}
