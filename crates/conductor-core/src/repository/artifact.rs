//! Artifact repository trait definition.

use conductor_types::artifact::Artifact;
use conductor_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for artifact persistence.
pub trait ArtifactRepository: Send + Sync {
    /// Upsert an artifact (insert or replace by ID).
    fn save_artifact(
        &self,
        artifact: &Artifact,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an artifact by its UUID.
    fn get_artifact(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Artifact>, RepositoryError>> + Send;

    /// List artifacts produced by a plan, newest first.
    fn list_artifacts(
        &self,
        plan_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Artifact>, RepositoryError>> + Send;
}
