//! SQLite queue repository implementation.
//!
//! The lease claim is a single `UPDATE ... WHERE id = (SELECT ...) RETURNING`
//! statement executed on the single-connection writer pool, so selection and
//! marking happen atomically: concurrent pollers can never lease the same
//! task, and the admission-control guard is evaluated inside the same
//! statement.

use chrono::{DateTime, Utc};
use conductor_core::repository::queue::QueueRepository;
use conductor_types::error::RepositoryError;
use conductor_types::queue::{QueueStats, QueueTask, TaskQueue, TaskStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_from_str, enum_str, format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `QueueRepository`.
pub struct SqliteQueueRepository {
    pool: DatabasePool,
}

impl SqliteQueueRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct QueueRow {
    id: String,
    name: String,
    max_concurrent: i64,
    priority: i64,
    is_active: i64,
    created_at: String,
}

impl QueueRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            max_concurrent: row.try_get("max_concurrent")?,
            priority: row.try_get("priority")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_queue(self) -> Result<TaskQueue, RepositoryError> {
        Ok(TaskQueue {
            id: parse_uuid(&self.id)?,
            name: self.name,
            max_concurrent: self.max_concurrent as u32,
            priority: self.priority as i32,
            is_active: self.is_active != 0,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct TaskRow {
    id: String,
    queue_id: String,
    task_type: String,
    task_data: String,
    status: String,
    priority: i64,
    retry_count: i64,
    max_retries: i64,
    next_retry_at: Option<String>,
    assigned_worker: Option<String>,
    result_data: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            queue_id: row.try_get("queue_id")?,
            task_type: row.try_get("task_type")?,
            task_data: row.try_get("task_data")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            next_retry_at: row.try_get("next_retry_at")?,
            assigned_worker: row.try_get("assigned_worker")?,
            result_data: row.try_get("result_data")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_task(self) -> Result<QueueTask, RepositoryError> {
        let status: TaskStatus = enum_from_str(&self.status)?;
        let task_data = serde_json::from_str(&self.task_data)
            .map_err(|e| RepositoryError::Query(format!("invalid task_data: {e}")))?;
        let result_data = self
            .result_data
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid result_data: {e}")))
            })
            .transpose()?;

        Ok(QueueTask {
            id: parse_uuid(&self.id)?,
            queue_id: parse_uuid(&self.queue_id)?,
            task_type: self.task_type,
            task_data,
            status,
            priority: self.priority as i32,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            next_retry_at: self.next_retry_at.as_deref().map(parse_datetime).transpose()?,
            assigned_worker: self.assigned_worker,
            result_data,
            error_message: self.error_message,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

const TASK_COLUMNS: &str = "id, queue_id, task_type, task_data, status, priority, retry_count, max_retries, next_retry_at, assigned_worker, result_data, error_message, created_at, updated_at, started_at, completed_at";

// ---------------------------------------------------------------------------
// QueueRepository impl
// ---------------------------------------------------------------------------

impl QueueRepository for SqliteQueueRepository {
    async fn create_queue(&self, queue: &TaskQueue) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO task_queues (id, name, max_concurrent, priority, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(queue.id.to_string())
        .bind(&queue.name)
        .bind(queue.max_concurrent as i64)
        .bind(queue.priority as i64)
        .bind(queue.is_active as i64)
        .bind(format_datetime(&queue.created_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("queue '{}' already exists", queue.name)),
            ),
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn get_queue_by_name(&self, name: &str) -> Result<Option<TaskQueue>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, max_concurrent, priority, is_active, created_at FROM task_queues WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = QueueRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_queue()?))
            }
            None => Ok(None),
        }
    }

    async fn create_task(&self, task: &QueueTask) -> Result<(), RepositoryError> {
        let status = enum_str(&task.status)?;
        let task_data = serde_json::to_string(&task.task_data)
            .map_err(|e| RepositoryError::Query(format!("serialize task_data: {e}")))?;
        let result_data = task
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize result_data: {e}")))?;

        sqlx::query(
            r#"INSERT INTO queue_tasks
               (id, queue_id, task_type, task_data, status, priority, retry_count, max_retries,
                next_retry_at, assigned_worker, result_data, error_message,
                created_at, updated_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.queue_id.to_string())
        .bind(&task.task_type)
        .bind(&task_data)
        .bind(&status)
        .bind(task.priority as i64)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(task.next_retry_at.as_ref().map(format_datetime))
        .bind(&task.assigned_worker)
        .bind(&result_data)
        .bind(&task.error_message)
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .bind(task.started_at.as_ref().map(format_datetime))
        .bind(task.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<QueueTask>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM queue_tasks WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = TaskRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_task()?))
            }
            None => Ok(None),
        }
    }

    async fn update_task(&self, task: &QueueTask) -> Result<(), RepositoryError> {
        let status = enum_str(&task.status)?;
        let result_data = task
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize result_data: {e}")))?;

        let result = sqlx::query(
            r#"UPDATE queue_tasks SET
                 status = ?, priority = ?, retry_count = ?, max_retries = ?,
                 next_retry_at = ?, assigned_worker = ?, result_data = ?, error_message = ?,
                 updated_at = ?, started_at = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(&status)
        .bind(task.priority as i64)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(task.next_retry_at.as_ref().map(format_datetime))
        .bind(&task.assigned_worker)
        .bind(&result_data)
        .bind(&task.error_message)
        .bind(format_datetime(&task.updated_at))
        .bind(task.started_at.as_ref().map(format_datetime))
        .bind(task.completed_at.as_ref().map(format_datetime))
        .bind(task.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn claim_next_task(
        &self,
        queue_id: &Uuid,
        max_concurrent: u32,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueTask>, RepositoryError> {
        let now_str = format_datetime(&now);
        let queue_str = queue_id.to_string();

        // Selection, admission guard, and marking in one statement on the
        // single-connection writer: the lease is exclusive.
        let row = sqlx::query(&format!(
            r#"UPDATE queue_tasks
               SET status = 'processing', assigned_worker = ?, started_at = ?, updated_at = ?
               WHERE id = (
                   SELECT id FROM queue_tasks
                   WHERE queue_id = ?
                     AND (status = 'pending'
                          OR (status = 'queued' AND (next_retry_at IS NULL OR next_retry_at <= ?)))
                     AND (SELECT COUNT(*) FROM queue_tasks
                          WHERE queue_id = ? AND status = 'processing') < ?
                   ORDER BY priority DESC, created_at ASC, id ASC
                   LIMIT 1
               )
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(worker_id)
        .bind(&now_str)
        .bind(&now_str)
        .bind(&queue_str)
        .bind(&now_str)
        .bind(&queue_str)
        .bind(max_concurrent as i64)
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = TaskRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_task()?))
            }
            None => Ok(None),
        }
    }

    async fn count_processing(&self, queue_id: &Uuid) -> Result<u64, RepositoryError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM queue_tasks WHERE queue_id = ? AND status = 'processing'",
        )
        .bind(queue_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(count.0 as u64)
    }

    async fn queue_stats(&self, queue_id: &Uuid) -> Result<QueueStats, RepositoryError> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM task_queues WHERE id = ?")
            .bind(queue_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM queue_tasks WHERE queue_id = ? GROUP BY status",
        )
        .bind(queue_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut stats = QueueStats {
            queue_name: name.map(|n| n.0).unwrap_or_default(),
            ..Default::default()
        };
        for (status, count) in rows {
            let count = count as u64;
            match enum_from_str::<TaskStatus>(&status)? {
                TaskStatus::Pending => stats.pending = count,
                TaskStatus::Queued => stats.queued = count,
                TaskStatus::Processing => stats.processing = count,
                TaskStatus::Completed => stats.completed = count,
                TaskStatus::Failed => stats.failed = count,
                TaskStatus::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }

    async fn list_failed_tasks(
        &self,
        queue_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<QueueTask>, RepositoryError> {
        let rows = match queue_id {
            Some(id) => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM queue_tasks WHERE status = 'failed' AND queue_id = ? ORDER BY updated_at DESC, id DESC LIMIT ?"
                ))
                .bind(id.to_string())
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM queue_tasks WHERE status = 'failed' ORDER BY updated_at DESC, id DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = TaskRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            tasks.push(r.into_task()?);
        }
        Ok(tasks)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
