//! SQLite work-request repository implementation.

use conductor_core::repository::request::RequestRepository;
use conductor_types::error::RepositoryError;
use conductor_types::workflow::{WorkRequest, WorkflowState};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_from_str, enum_str, format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `RequestRepository`.
pub struct SqliteRequestRepository {
    pool: DatabasePool,
}

impl SqliteRequestRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct RequestRow {
    id: String,
    summary: String,
    state: String,
    plan_id: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            summary: row.try_get("summary")?,
            state: row.try_get("state")?,
            plan_id: row.try_get("plan_id")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_request(self) -> Result<WorkRequest, RepositoryError> {
        let state: WorkflowState = enum_from_str(&self.state)?;
        Ok(WorkRequest {
            id: parse_uuid(&self.id)?,
            summary: self.summary,
            state,
            plan_id: self.plan_id.as_deref().map(parse_uuid).transpose()?,
            error: self.error,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// RequestRepository impl
// ---------------------------------------------------------------------------

impl RequestRepository for SqliteRequestRepository {
    async fn save_request(&self, request: &WorkRequest) -> Result<(), RepositoryError> {
        let state = enum_str(&request.state)?;

        sqlx::query(
            r#"INSERT INTO work_requests (id, summary, state, plan_id, error, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 summary = excluded.summary,
                 state = excluded.state,
                 plan_id = excluded.plan_id,
                 error = excluded.error,
                 updated_at = excluded.updated_at"#,
        )
        .bind(request.id.to_string())
        .bind(&request.summary)
        .bind(&state)
        .bind(request.plan_id.map(|id| id.to_string()))
        .bind(&request.error)
        .bind(format_datetime(&request.created_at))
        .bind(format_datetime(&request.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_request(&self, id: &Uuid) -> Result<Option<WorkRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, summary, state, plan_id, error, created_at, updated_at FROM work_requests WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = RequestRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_request()?))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_repo() -> (tempfile::TempDir, SqliteRequestRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteRequestRepository::new(pool))
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let (_dir, repo) = test_repo().await;
        let request = WorkRequest {
            id: Uuid::now_v7(),
            summary: "migrate billing".to_string(),
            state: WorkflowState::Planning,
            plan_id: Some(Uuid::now_v7()),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.save_request(&request).await.unwrap();

        let loaded = repo.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(loaded.summary, "migrate billing");
        assert_eq!(loaded.state, WorkflowState::Planning);
        assert_eq!(loaded.plan_id, request.plan_id);
    }

    #[tokio::test]
    async fn test_save_updates_state_and_error() {
        let (_dir, repo) = test_repo().await;
        let mut request = WorkRequest {
            id: Uuid::now_v7(),
            summary: "req".to_string(),
            state: WorkflowState::Executing,
            plan_id: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.save_request(&request).await.unwrap();

        request.state = WorkflowState::Failed;
        request.error = Some("step crashed".to_string());
        repo.save_request(&request).await.unwrap();

        let loaded = repo.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, WorkflowState::Failed);
        assert_eq!(loaded.error.as_deref(), Some("step crashed"));
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() {
        let (_dir, repo) = test_repo().await;
        assert!(repo.get_request(&Uuid::now_v7()).await.unwrap().is_none());
    }
}
