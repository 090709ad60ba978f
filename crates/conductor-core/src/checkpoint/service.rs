//! Checkpoint service: content-addressed snapshots and verified rollback.
//!
//! Every checkpoint stores an opaque JSON payload plus a content hash over
//! its canonical serialization. Restore recomputes the hash and fails on any
//! drift, so a rollback never applies tampered or corrupted state. Rollback
//! dispatches on the entity kind and maps the restored payload back onto the
//! live entity.

use std::sync::Arc;

use chrono::Utc;
use conductor_types::artifact::Artifact;
use conductor_types::checkpoint::{Checkpoint, EntityKind};
use conductor_types::plan::Plan;
use conductor_types::workflow::WorkRequest;
use serde_json::Value;
use uuid::Uuid;

use crate::repository::artifact::ArtifactRepository;
use crate::repository::checkpoint::CheckpointRepository;
use crate::repository::plan::PlanRepository;
use crate::repository::request::RequestRepository;
use crate::service::hash::ContentHasher;

use super::canonical::canonical_json;

// ---------------------------------------------------------------------------
// CheckpointService
// ---------------------------------------------------------------------------

/// Creates, verifies, and rolls back entity checkpoints.
///
/// Generic over the repository ports so it works with any storage backend.
/// Checkpoint creation must complete before the mutation it guards is
/// applied; callers await it synchronously.
pub struct CheckpointService<C, P, R, A>
where
    C: CheckpointRepository,
    P: PlanRepository,
    R: RequestRepository,
    A: ArtifactRepository,
{
    checkpoints: C,
    plans: P,
    requests: R,
    artifacts: A,
    hasher: Arc<dyn ContentHasher>,
}

impl<C, P, R, A> CheckpointService<C, P, R, A>
where
    C: CheckpointRepository,
    P: PlanRepository,
    R: RequestRepository,
    A: ArtifactRepository,
{
    /// Create a new checkpoint service over the given repositories.
    pub fn new(checkpoints: C, plans: P, requests: R, artifacts: A, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            checkpoints,
            plans,
            requests,
            artifacts,
            hasher,
        }
    }

    /// Snapshot an entity's state.
    ///
    /// The payload is canonicalized (sorted object keys) before hashing, so
    /// logically-equal payloads always produce the same `state_hash`.
    pub async fn create_checkpoint(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
        state_data: Value,
        reason: &str,
        created_by: &str,
        trace_id: Option<String>,
    ) -> Result<Checkpoint, CheckpointError> {
        let state_hash = self.hasher.compute_hash(&canonical_json(&state_data));

        let checkpoint = Checkpoint {
            id: Uuid::now_v7(),
            entity_kind,
            entity_id,
            state_data,
            state_hash,
            reason: reason.to_string(),
            created_by: created_by.to_string(),
            trace_id,
            created_at: Utc::now(),
        };

        self.checkpoints
            .create_checkpoint(&checkpoint)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            checkpoint_id = %checkpoint.id,
            entity_kind = ?entity_kind,
            entity_id = %entity_id,
            reason,
            "checkpoint created"
        );

        Ok(checkpoint)
    }

    /// Restore a checkpoint's payload after verifying its content hash.
    pub async fn restore_checkpoint(&self, id: Uuid) -> Result<Value, CheckpointError> {
        let checkpoint = self
            .checkpoints
            .get_checkpoint(&id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::NotFound(id))?;

        self.verify(&checkpoint)?;
        Ok(checkpoint.state_data)
    }

    /// Roll an entity back to a checkpoint (the latest one by default).
    ///
    /// The restored payload is applied through a kind-specific field mapping.
    /// An `Unknown` kind logs a warning and performs no mutation, returning
    /// `Ok(None)`. On success the applied checkpoint is returned.
    pub async fn rollback_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
        checkpoint_id: Option<Uuid>,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let checkpoint = match checkpoint_id {
            Some(id) => self
                .checkpoints
                .get_checkpoint(&id)
                .await
                .map_err(|e| CheckpointError::Repository(e.to_string()))?
                .ok_or(CheckpointError::NotFound(id))?,
            None => self
                .checkpoints
                .latest_for_entity(entity_kind, &entity_id)
                .await
                .map_err(|e| CheckpointError::Repository(e.to_string()))?
                .ok_or(CheckpointError::NoCheckpointForEntity {
                    entity_kind,
                    entity_id,
                })?,
        };

        self.verify(&checkpoint)?;

        match entity_kind {
            EntityKind::Plan => self.apply_plan(entity_id, &checkpoint.state_data).await?,
            EntityKind::Task => self.apply_request(entity_id, &checkpoint.state_data).await?,
            EntityKind::Artifact => {
                self.apply_artifact(entity_id, &checkpoint.state_data).await?
            }
            EntityKind::Unknown => {
                tracing::warn!(
                    entity_id = %entity_id,
                    "rollback requested for unrecognized entity kind, skipping"
                );
                return Ok(None);
            }
        }

        tracing::info!(
            checkpoint_id = %checkpoint.id,
            entity_kind = ?entity_kind,
            entity_id = %entity_id,
            "entity rolled back"
        );

        Ok(Some(checkpoint))
    }

    /// Most recent checkpoint for an entity.
    pub async fn latest_checkpoint(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        self.checkpoints
            .latest_for_entity(entity_kind, &entity_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Checkpoints for an entity, newest first.
    pub async fn list_checkpoints(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.checkpoints
            .list_for_entity(entity_kind, &entity_id, limit)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Recompute the payload hash and compare it against the stored one.
    fn verify(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let actual = self.hasher.compute_hash(&canonical_json(&checkpoint.state_data));
        if actual != checkpoint.state_hash {
            return Err(CheckpointError::IntegrityMismatch {
                expected: checkpoint.state_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Map a plan snapshot onto the live plan: status, step cursor, and the
    /// per-step statuses/outputs roll back; identity and audit fields do not.
    async fn apply_plan(&self, plan_id: Uuid, state: &Value) -> Result<(), CheckpointError> {
        let snapshot: Plan = serde_json::from_value(state.clone())
            .map_err(|e| CheckpointError::Payload(e.to_string()))?;

        let mut plan = self
            .plans
            .get_plan(&plan_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::EntityNotFound(plan_id))?;

        plan.status = snapshot.status;
        plan.current_step = snapshot.current_step;
        plan.steps = snapshot.steps;
        plan.actual_duration_secs = snapshot.actual_duration_secs;
        plan.updated_at = Utc::now();

        self.plans
            .save_plan(&plan)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Map a work-request snapshot onto the live request.
    async fn apply_request(&self, request_id: Uuid, state: &Value) -> Result<(), CheckpointError> {
        let snapshot: WorkRequest = serde_json::from_value(state.clone())
            .map_err(|e| CheckpointError::Payload(e.to_string()))?;

        let mut request = self
            .requests
            .get_request(&request_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::EntityNotFound(request_id))?;

        request.state = snapshot.state;
        request.plan_id = snapshot.plan_id;
        request.error = snapshot.error;
        request.updated_at = Utc::now();

        self.requests
            .save_request(&request)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Map an artifact snapshot onto the live artifact.
    async fn apply_artifact(&self, artifact_id: Uuid, state: &Value) -> Result<(), CheckpointError> {
        let snapshot: Artifact = serde_json::from_value(state.clone())
            .map_err(|e| CheckpointError::Payload(e.to_string()))?;

        let mut artifact = self
            .artifacts
            .get_artifact(&artifact_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::EntityNotFound(artifact_id))?;

        artifact.content = snapshot.content;
        artifact.version = snapshot.version;
        artifact.updated_at = Utc::now();

        self.artifacts
            .save_artifact(&artifact)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Checkpoint ID does not exist.
    #[error("checkpoint not found: {0}")]
    NotFound(Uuid),

    /// No checkpoint has been recorded for the entity.
    #[error("no checkpoint recorded for {entity_kind:?} {entity_id}")]
    NoCheckpointForEntity {
        entity_kind: EntityKind,
        entity_id: Uuid,
    },

    /// Recomputed payload hash differs from the stored hash.
    #[error("checkpoint hash mismatch: expected '{expected}', got '{actual}'")]
    IntegrityMismatch { expected: String, actual: String },

    /// The live entity targeted by a rollback does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(Uuid),

    /// Stored payload does not deserialize into the expected entity shape.
    #[error("invalid checkpoint payload: {0}")]
    Payload(String),

    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryArtifacts, MemoryCheckpoints, MemoryPlans, MemoryRequests, TestHasher};
    use conductor_types::plan::{PlanStatus, PlanStep, StepKind, StepStatus};
    use conductor_types::workflow::WorkflowState;
    use serde_json::json;

    type Service = CheckpointService<MemoryCheckpoints, MemoryPlans, MemoryRequests, MemoryArtifacts>;

    fn make_service() -> Service {
        CheckpointService::new(
            MemoryCheckpoints::default(),
            MemoryPlans::default(),
            MemoryRequests::default(),
            MemoryArtifacts::default(),
            Arc::new(TestHasher),
        )
    }

    fn make_plan() -> Plan {
        let mut step = PlanStep::new("apply", StepKind::Action, "Apply migration");
        step.status = StepStatus::Pending;
        Plan {
            id: Uuid::now_v7(),
            request_id: None,
            goal: "migrate".to_string(),
            steps: vec![step],
            current_step: 0,
            status: PlanStatus::Approved,
            version: 1,
            estimated_duration_secs: None,
            actual_duration_secs: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_restore_roundtrip() {
        let service = make_service();
        let entity_id = Uuid::now_v7();
        let payload = json!({"b": 2, "a": 1});

        let checkpoint = service
            .create_checkpoint(
                EntityKind::Plan,
                entity_id,
                payload.clone(),
                "pre-step",
                "test",
                None,
            )
            .await
            .unwrap();

        let restored = service.restore_checkpoint(checkpoint.id).await.unwrap();
        assert_eq!(restored, payload);
    }

    #[tokio::test]
    async fn test_restore_detects_tampering() {
        let service = make_service();
        let entity_id = Uuid::now_v7();

        let checkpoint = service
            .create_checkpoint(
                EntityKind::Plan,
                entity_id,
                json!({"balance": 100}),
                "pre-step",
                "test",
                None,
            )
            .await
            .unwrap();

        service
            .checkpoints
            .tamper(&checkpoint.id, json!({"balance": 1_000_000}));

        let err = service.restore_checkpoint(checkpoint.id).await.unwrap_err();
        assert!(matches!(err, CheckpointError::IntegrityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_hash_stable_across_key_order() {
        let service = make_service();
        let entity_id = Uuid::now_v7();

        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();

        let cp_a = service
            .create_checkpoint(EntityKind::Plan, entity_id, a, "a", "test", None)
            .await
            .unwrap();
        let cp_b = service
            .create_checkpoint(EntityKind::Plan, entity_id, b, "b", "test", None)
            .await
            .unwrap();

        assert_eq!(cp_a.state_hash, cp_b.state_hash);
    }

    #[tokio::test]
    async fn test_restore_unknown_id_fails() {
        let service = make_service();
        let err = service.restore_checkpoint(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_plan_restores_cursor_and_steps() {
        let service = make_service();
        let plan = make_plan();
        service.plans.save_plan(&plan).await.unwrap();

        // Snapshot the pristine plan.
        let snapshot = serde_json::to_value(&plan).unwrap();
        service
            .create_checkpoint(EntityKind::Plan, plan.id, snapshot, "pre-step apply", "test", None)
            .await
            .unwrap();

        // Mutate the live plan as execution would.
        let mut advanced = plan.clone();
        advanced.current_step = 1;
        advanced.status = PlanStatus::Failed;
        advanced.steps[0].status = StepStatus::Failed;
        service.plans.save_plan(&advanced).await.unwrap();

        let applied = service
            .rollback_entity(EntityKind::Plan, plan.id, None)
            .await
            .unwrap();
        assert!(applied.is_some());

        let rolled_back = service.plans.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(rolled_back.current_step, 0);
        assert_eq!(rolled_back.status, PlanStatus::Approved);
        assert_eq!(rolled_back.steps[0].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_rollback_defaults_to_latest_checkpoint() {
        let service = make_service();
        let mut plan = make_plan();
        service.plans.save_plan(&plan).await.unwrap();

        service
            .create_checkpoint(
                EntityKind::Plan,
                plan.id,
                serde_json::to_value(&plan).unwrap(),
                "first",
                "test",
                None,
            )
            .await
            .unwrap();

        plan.current_step = 1;
        plan.status = PlanStatus::InProgress;
        service
            .create_checkpoint(
                EntityKind::Plan,
                plan.id,
                serde_json::to_value(&plan).unwrap(),
                "second",
                "test",
                None,
            )
            .await
            .unwrap();

        let applied = service
            .rollback_entity(EntityKind::Plan, plan.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.reason, "second");

        let live = service.plans.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(live.current_step, 1);
        assert_eq!(live.status, PlanStatus::InProgress);
    }

    #[tokio::test]
    async fn test_rollback_work_request() {
        let service = make_service();
        let request = WorkRequest {
            id: Uuid::now_v7(),
            summary: "req".to_string(),
            state: WorkflowState::Executing,
            plan_id: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        service.requests.save_request(&request).await.unwrap();

        service
            .create_checkpoint(
                EntityKind::Task,
                request.id,
                serde_json::to_value(&request).unwrap(),
                "pre-step",
                "test",
                None,
            )
            .await
            .unwrap();

        let mut failed = request.clone();
        failed.state = WorkflowState::Failed;
        failed.error = Some("boom".to_string());
        service.requests.save_request(&failed).await.unwrap();

        service
            .rollback_entity(EntityKind::Task, request.id, None)
            .await
            .unwrap();

        let live = service.requests.get_request(&request.id).await.unwrap().unwrap();
        assert_eq!(live.state, WorkflowState::Executing);
        assert!(live.error.is_none());
    }

    #[tokio::test]
    async fn test_rollback_artifact() {
        let service = make_service();
        let artifact = Artifact {
            id: Uuid::now_v7(),
            plan_id: Uuid::now_v7(),
            name: "report".to_string(),
            content: json!({"rows": 10}),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        service.artifacts.save_artifact(&artifact).await.unwrap();

        service
            .create_checkpoint(
                EntityKind::Artifact,
                artifact.id,
                serde_json::to_value(&artifact).unwrap(),
                "pre-overwrite",
                "test",
                None,
            )
            .await
            .unwrap();

        let mut overwritten = artifact.clone();
        overwritten.content = json!({"rows": 0});
        overwritten.version = 2;
        service.artifacts.save_artifact(&overwritten).await.unwrap();

        service
            .rollback_entity(EntityKind::Artifact, artifact.id, None)
            .await
            .unwrap();

        let live = service.artifacts.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(live.content, json!({"rows": 10}));
        assert_eq!(live.version, 1);
    }

    #[tokio::test]
    async fn test_rollback_unknown_kind_is_noop() {
        let service = make_service();
        let entity_id = Uuid::now_v7();
        service
            .create_checkpoint(EntityKind::Unknown, entity_id, json!({}), "x", "test", None)
            .await
            .unwrap();

        let applied = service
            .rollback_entity(EntityKind::Unknown, entity_id, None)
            .await
            .unwrap();
        assert!(applied.is_none());
    }

    #[tokio::test]
    async fn test_rollback_without_checkpoint_fails() {
        let service = make_service();
        let err = service
            .rollback_entity(EntityKind::Plan, Uuid::now_v7(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::NoCheckpointForEntity { .. }));
    }

    #[tokio::test]
    async fn test_list_checkpoints_newest_first_with_limit() {
        let service = make_service();
        let entity_id = Uuid::now_v7();

        for reason in ["one", "two", "three"] {
            service
                .create_checkpoint(EntityKind::Plan, entity_id, json!({"r": reason}), reason, "test", None)
                .await
                .unwrap();
        }

        let listed = service
            .list_checkpoints(EntityKind::Plan, entity_id, 2)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].reason, "three");
        assert_eq!(listed[1].reason, "two");

        let latest = service
            .latest_checkpoint(EntityKind::Plan, entity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.reason, "three");
    }
}
