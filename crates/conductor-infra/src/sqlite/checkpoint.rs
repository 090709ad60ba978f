//! SQLite checkpoint repository implementation.
//!
//! Checkpoints are insert-only. Queries are scoped to one
//! (entity_kind, entity_id) pair and ordered by recency; the UUIDv7 primary
//! key breaks ties between checkpoints written in the same microsecond.

use conductor_core::repository::checkpoint::CheckpointRepository;
use conductor_types::checkpoint::{Checkpoint, EntityKind};
use conductor_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{enum_from_str, enum_str, format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `CheckpointRepository`.
pub struct SqliteCheckpointRepository {
    pool: DatabasePool,
}

impl SqliteCheckpointRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    id: String,
    entity_kind: String,
    entity_id: String,
    state_data: String,
    state_hash: String,
    reason: String,
    created_by: String,
    trace_id: Option<String>,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            entity_kind: row.try_get("entity_kind")?,
            entity_id: row.try_get("entity_id")?,
            state_data: row.try_get("state_data")?,
            state_hash: row.try_get("state_hash")?,
            reason: row.try_get("reason")?,
            created_by: row.try_get("created_by")?,
            trace_id: row.try_get("trace_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        let entity_kind: EntityKind = enum_from_str(&self.entity_kind)?;
        let state_data = serde_json::from_str(&self.state_data)
            .map_err(|e| RepositoryError::Query(format!("invalid checkpoint payload: {e}")))?;

        Ok(Checkpoint {
            id: parse_uuid(&self.id)?,
            entity_kind,
            entity_id: parse_uuid(&self.entity_id)?,
            state_data,
            state_hash: self.state_hash,
            reason: self.reason,
            created_by: self.created_by,
            trace_id: self.trace_id,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, entity_kind, entity_id, state_data, state_hash, reason, created_by, trace_id, created_at";

// ---------------------------------------------------------------------------
// CheckpointRepository impl
// ---------------------------------------------------------------------------

impl CheckpointRepository for SqliteCheckpointRepository {
    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        let entity_kind = enum_str(&checkpoint.entity_kind)?;
        let state_data = serde_json::to_string(&checkpoint.state_data)
            .map_err(|e| RepositoryError::Query(format!("serialize checkpoint payload: {e}")))?;

        sqlx::query(
            r#"INSERT INTO checkpoints
               (id, entity_kind, entity_id, state_data, state_hash, reason, created_by, trace_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(checkpoint.id.to_string())
        .bind(&entity_kind)
        .bind(checkpoint.entity_id.to_string())
        .bind(&state_data)
        .bind(&checkpoint.state_hash)
        .bind(&checkpoint.reason)
        .bind(&checkpoint.created_by)
        .bind(&checkpoint.trace_id)
        .bind(format_datetime(&checkpoint.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_checkpoint(&self, id: &Uuid) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn latest_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let kind = enum_str(&entity_kind)?;
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE entity_kind = ? AND entity_id = ? ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(&kind)
        .bind(entity_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let kind = enum_str(&entity_kind)?;
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE entity_kind = ? AND entity_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(&kind)
        .bind(entity_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut checkpoints = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = CheckpointRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            checkpoints.push(r.into_checkpoint()?);
        }
        Ok(checkpoints)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    async fn test_repo() -> (tempfile::TempDir, SqliteCheckpointRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteCheckpointRepository::new(pool))
    }

    fn make_checkpoint(entity_id: Uuid, reason: &str) -> Checkpoint {
        Checkpoint {
            id: Uuid::now_v7(),
            entity_kind: EntityKind::Plan,
            entity_id,
            state_data: json!({"current_step": 1, "status": "in_progress"}),
            state_hash: "f".repeat(64),
            reason: reason.to_string(),
            created_by: "execution-service".to_string(),
            trace_id: Some("run-abc".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let (_dir, repo) = test_repo().await;
        let checkpoint = make_checkpoint(Uuid::now_v7(), "pre-step apply");
        repo.create_checkpoint(&checkpoint).await.unwrap();

        let loaded = repo.get_checkpoint(&checkpoint.id).await.unwrap().unwrap();
        assert_eq!(loaded.entity_kind, EntityKind::Plan);
        assert_eq!(loaded.state_data, checkpoint.state_data);
        assert_eq!(loaded.state_hash, checkpoint.state_hash);
        assert_eq!(loaded.trace_id.as_deref(), Some("run-abc"));
    }

    #[tokio::test]
    async fn test_latest_and_list_ordering() {
        let (_dir, repo) = test_repo().await;
        let entity_id = Uuid::now_v7();

        for reason in ["first", "second", "third"] {
            repo.create_checkpoint(&make_checkpoint(entity_id, reason))
                .await
                .unwrap();
        }

        let latest = repo
            .latest_for_entity(EntityKind::Plan, &entity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.reason, "third");

        let listed = repo
            .list_for_entity(EntityKind::Plan, &entity_id, 2)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].reason, "third");
        assert_eq!(listed[1].reason, "second");
    }

    #[tokio::test]
    async fn test_scoping_by_kind_and_entity() {
        let (_dir, repo) = test_repo().await;
        let plan_id = Uuid::now_v7();
        let other_id = Uuid::now_v7();

        repo.create_checkpoint(&make_checkpoint(plan_id, "mine")).await.unwrap();
        repo.create_checkpoint(&make_checkpoint(other_id, "theirs")).await.unwrap();

        let mut task_kind = make_checkpoint(plan_id, "task-scoped");
        task_kind.entity_kind = EntityKind::Task;
        repo.create_checkpoint(&task_kind).await.unwrap();

        let listed = repo
            .list_for_entity(EntityKind::Plan, &plan_id, 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].reason, "mine");
    }

    #[tokio::test]
    async fn test_latest_for_unknown_entity_is_none() {
        let (_dir, repo) = test_repo().await;
        assert!(repo
            .latest_for_entity(EntityKind::Plan, &Uuid::now_v7())
            .await
            .unwrap()
            .is_none());
    }
}
