//! Checkpoint repository trait definition.
//!
//! Checkpoints are insert-only: records are never updated or deleted once
//! written. Queries are scoped to one (entity_kind, entity_id) pair and
//! ordered by recency.

use conductor_types::checkpoint::{Checkpoint, EntityKind};
use conductor_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for checkpoint persistence.
pub trait CheckpointRepository: Send + Sync {
    /// Insert a checkpoint record. Records are immutable once written.
    fn create_checkpoint(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a checkpoint by its UUID.
    fn get_checkpoint(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// Get the most recent checkpoint for an entity.
    fn latest_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// List checkpoints for an entity, newest first.
    fn list_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Checkpoint>, RepositoryError>> + Send;
}
