//! SQLite plan repository implementation.
//!
//! Plans are stored as JSON documents alongside indexed status and
//! request-link columns, so the execution service can read, mutate, and save
//! whole plans while list queries stay cheap.

use conductor_core::repository::plan::PlanRepository;
use conductor_types::error::RepositoryError;
use conductor_types::plan::{Plan, PlanStatus};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_str, format_datetime};

/// SQLite-backed implementation of `PlanRepository`.
pub struct SqlitePlanRepository {
    pool: DatabasePool,
}

impl SqlitePlanRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct PlanRow {
    document: String,
}

impl PlanRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            document: row.try_get("document")?,
        })
    }

    fn into_plan(self) -> Result<Plan, RepositoryError> {
        serde_json::from_str(&self.document)
            .map_err(|e| RepositoryError::Query(format!("invalid plan document JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// PlanRepository impl
// ---------------------------------------------------------------------------

impl PlanRepository for SqlitePlanRepository {
    async fn save_plan(&self, plan: &Plan) -> Result<(), RepositoryError> {
        let document = serde_json::to_string(plan)
            .map_err(|e| RepositoryError::Query(format!("serialize plan: {e}")))?;
        let status = enum_str(&plan.status)?;

        sqlx::query(
            r#"INSERT INTO plans (id, request_id, status, document, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 request_id = excluded.request_id,
                 status = excluded.status,
                 document = excluded.document,
                 updated_at = excluded.updated_at"#,
        )
        .bind(plan.id.to_string())
        .bind(plan.request_id.map(|id| id.to_string()))
        .bind(&status)
        .bind(&document)
        .bind(format_datetime(&plan.created_at))
        .bind(format_datetime(&plan.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_plan(&self, id: &Uuid) -> Result<Option<Plan>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM plans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = PlanRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_plan()?))
            }
            None => Ok(None),
        }
    }

    async fn list_plans(
        &self,
        status: Option<PlanStatus>,
        limit: u32,
    ) -> Result<Vec<Plan>, RepositoryError> {
        let rows = match status {
            Some(s) => {
                let status_str = enum_str(&s)?;
                sqlx::query(
                    "SELECT document FROM plans WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(status_str)
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT document FROM plans ORDER BY created_at DESC, id DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = PlanRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            plans.push(r.into_plan()?);
        }
        Ok(plans)
    }

    async fn delete_plan(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
