//! SQLite artifact repository implementation.

use conductor_core::repository::artifact::ArtifactRepository;
use conductor_types::artifact::Artifact;
use conductor_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `ArtifactRepository`.
pub struct SqliteArtifactRepository {
    pool: DatabasePool,
}

impl SqliteArtifactRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ArtifactRow {
    id: String,
    plan_id: String,
    name: String,
    content: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl ArtifactRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            plan_id: row.try_get("plan_id")?,
            name: row.try_get("name")?,
            content: row.try_get("content")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_artifact(self) -> Result<Artifact, RepositoryError> {
        let content = serde_json::from_str(&self.content)
            .map_err(|e| RepositoryError::Query(format!("invalid artifact content: {e}")))?;
        Ok(Artifact {
            id: parse_uuid(&self.id)?,
            plan_id: parse_uuid(&self.plan_id)?,
            name: self.name,
            content,
            version: self.version as u32,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ArtifactRepository impl
// ---------------------------------------------------------------------------

impl ArtifactRepository for SqliteArtifactRepository {
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        let content = serde_json::to_string(&artifact.content)
            .map_err(|e| RepositoryError::Query(format!("serialize artifact content: {e}")))?;

        sqlx::query(
            r#"INSERT INTO artifacts (id, plan_id, name, content, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 content = excluded.content,
                 version = excluded.version,
                 updated_at = excluded.updated_at"#,
        )
        .bind(artifact.id.to_string())
        .bind(artifact.plan_id.to_string())
        .bind(&artifact.name)
        .bind(&content)
        .bind(artifact.version as i64)
        .bind(format_datetime(&artifact.created_at))
        .bind(format_datetime(&artifact.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_artifact(&self, id: &Uuid) -> Result<Option<Artifact>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, plan_id, name, content, version, created_at, updated_at FROM artifacts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ArtifactRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_artifact()?))
            }
            None => Ok(None),
        }
    }

    async fn list_artifacts(&self, plan_id: &Uuid) -> Result<Vec<Artifact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, plan_id, name, content, version, created_at, updated_at FROM artifacts WHERE plan_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(plan_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut artifacts = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ArtifactRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            artifacts.push(r.into_artifact()?);
        }
        Ok(artifacts)
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

    async fn test_repo() -> (tempfile::TempDir, SqliteArtifactRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteArtifactRepository::new(pool))
    }

    fn make_artifact(plan_id: Uuid, name: &str) -> Artifact {
        Artifact {
            id: Uuid::now_v7(),
            plan_id,
            name: name.to_string(),
            content: json!({"rows": 12}),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let (_dir, repo) = test_repo().await;
        let artifact = make_artifact(Uuid::now_v7(), "report");
        repo.save_artifact(&artifact).await.unwrap();

        let loaded = repo.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "report");
        assert_eq!(loaded.content, json!({"rows": 12}));
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_save_is_upsert_with_version_bump() {
        let (_dir, repo) = test_repo().await;
        let mut artifact = make_artifact(Uuid::now_v7(), "report");
        repo.save_artifact(&artifact).await.unwrap();

        artifact.content = json!({"rows": 99});
        artifact.version = 2;
        repo.save_artifact(&artifact).await.unwrap();

        let loaded = repo.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.content, json!({"rows": 99}));
    }

    #[tokio::test]
    async fn test_list_scoped_to_plan() {
        let (_dir, repo) = test_repo().await;
        let plan_a = Uuid::now_v7();
        let plan_b = Uuid::now_v7();
        repo.save_artifact(&make_artifact(plan_a, "one")).await.unwrap();
        repo.save_artifact(&make_artifact(plan_a, "two")).await.unwrap();
        repo.save_artifact(&make_artifact(plan_b, "other")).await.unwrap();

        let listed = repo.list_artifacts(&plan_a).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|a| a.plan_id == plan_a));
    }
}
