//! In-memory repository implementations shared by the crate's tests.
//!
//! Each store keeps rows in a `Mutex<HashMap>` and implements the matching
//! repository port. The claim operation performs its select-then-mark under
//! the lock, matching the atomicity the real SQLite implementation gets from
//! its single-connection writer pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use conductor_types::artifact::Artifact;
use conductor_types::checkpoint::{Checkpoint, EntityKind};
use conductor_types::error::RepositoryError;
use conductor_types::plan::{Plan, PlanStatus};
use conductor_types::queue::{QueueStats, QueueTask, TaskQueue, TaskStatus};
use conductor_types::workflow::WorkRequest;
use uuid::Uuid;

use crate::repository::artifact::ArtifactRepository;
use crate::repository::checkpoint::CheckpointRepository;
use crate::repository::plan::PlanRepository;
use crate::repository::queue::QueueRepository;
use crate::repository::request::RequestRepository;
use crate::service::hash::ContentHasher;

// ---------------------------------------------------------------------------
// Hasher
// ---------------------------------------------------------------------------

/// Deterministic FNV-1a hasher, good enough for integrity tests.
pub struct TestHasher;

impl ContentHasher for TestHasher {
    fn compute_hash(&self, content: &str) -> String {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in content.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        format!("{hash:016x}")
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MemoryPlans {
    rows: Arc<Mutex<HashMap<Uuid, Plan>>>,
}

impl PlanRepository for MemoryPlans {
    async fn save_plan(&self, plan: &Plan) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .insert(plan.id, plan.clone());
        Ok(())
    }

    async fn get_plan(&self, id: &Uuid) -> Result<Option<Plan>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .get(id)
            .cloned())
    }

    async fn list_plans(
        &self,
        status: Option<PlanStatus>,
        limit: u32,
    ) -> Result<Vec<Plan>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| RepositoryError::Connection)?;
        let mut plans: Vec<Plan> = rows
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        plans.truncate(limit as usize);
        Ok(plans)
    }

    async fn delete_plan(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .remove(id)
            .is_some())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MemoryRequests {
    rows: Arc<Mutex<HashMap<Uuid, WorkRequest>>>,
}

impl RequestRepository for MemoryRequests {
    async fn save_request(&self, request: &WorkRequest) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &Uuid) -> Result<Option<WorkRequest>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .get(id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MemoryArtifacts {
    rows: Arc<Mutex<HashMap<Uuid, Artifact>>>,
}

impl ArtifactRepository for MemoryArtifacts {
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: &Uuid) -> Result<Option<Artifact>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .get(id)
            .cloned())
    }

    async fn list_artifacts(&self, plan_id: &Uuid) -> Result<Vec<Artifact>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| RepositoryError::Connection)?;
        let mut artifacts: Vec<Artifact> = rows
            .values()
            .filter(|a| a.plan_id == *plan_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(artifacts)
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MemoryCheckpoints {
    rows: Arc<Mutex<Vec<Checkpoint>>>,
}

impl MemoryCheckpoints {
    /// Corrupt a stored payload in place (integrity tests).
    pub fn tamper(&self, id: &Uuid, new_data: serde_json::Value) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|c| c.id == *id) {
            row.state_data = new_data;
        }
    }
}

impl CheckpointRepository for MemoryCheckpoints {
    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .push(checkpoint.clone());
        Ok(())
    }

    async fn get_checkpoint(&self, id: &Uuid) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .iter()
            .find(|c| c.id == *id)
            .cloned())
    }

    async fn latest_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| RepositoryError::Connection)?;
        Ok(rows
            .iter()
            .filter(|c| c.entity_kind == entity_kind && c.entity_id == *entity_id)
            .max_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn list_for_entity(
        &self,
        entity_kind: EntityKind,
        entity_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let rows = self.rows.lock().map_err(|_| RepositoryError::Connection)?;
        let mut matches: Vec<Checkpoint> = rows
            .iter()
            .filter(|c| c.entity_kind == entity_kind && c.entity_id == *entity_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        matches.truncate(limit as usize);
        Ok(matches)
    }
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MemoryQueues {
    queues: Arc<Mutex<HashMap<Uuid, TaskQueue>>>,
    tasks: Arc<Mutex<HashMap<Uuid, QueueTask>>>,
}

impl QueueRepository for MemoryQueues {
    async fn create_queue(&self, queue: &TaskQueue) -> Result<(), RepositoryError> {
        let mut queues = self.queues.lock().map_err(|_| RepositoryError::Connection)?;
        if queues.values().any(|q| q.name == queue.name) {
            return Err(RepositoryError::Conflict(format!(
                "queue '{}' already exists",
                queue.name
            )));
        }
        queues.insert(queue.id, queue.clone());
        Ok(())
    }

    async fn get_queue_by_name(&self, name: &str) -> Result<Option<TaskQueue>, RepositoryError> {
        Ok(self
            .queues
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .values()
            .find(|q| q.name == name)
            .cloned())
    }

    async fn create_task(&self, task: &QueueTask) -> Result<(), RepositoryError> {
        self.tasks
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<QueueTask>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .get(id)
            .cloned())
    }

    async fn update_task(&self, task: &QueueTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().map_err(|_| RepositoryError::Connection)?;
        if !tasks.contains_key(&task.id) {
            return Err(RepositoryError::NotFound);
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn claim_next_task(
        &self,
        queue_id: &Uuid,
        max_concurrent: u32,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueTask>, RepositoryError> {
        // Single lock scope: the admission check, the selection, and the mark
        // are one atomic step, like the SQL claim statement.
        let mut tasks = self.tasks.lock().map_err(|_| RepositoryError::Connection)?;

        let processing = tasks
            .values()
            .filter(|t| t.queue_id == *queue_id && t.status == TaskStatus::Processing)
            .count() as u32;
        if processing >= max_concurrent {
            return Ok(None);
        }

        let eligible = tasks
            .values()
            .filter(|t| {
                t.queue_id == *queue_id
                    && match t.status {
                        TaskStatus::Pending => true,
                        TaskStatus::Queued => {
                            t.next_retry_at.is_none_or(|at| at <= now)
                        }
                        _ => false,
                    }
            })
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|t| t.id);

        let Some(id) = eligible else {
            return Ok(None);
        };

        let task = tasks.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        task.status = TaskStatus::Processing;
        task.assigned_worker = Some(worker_id.to_string());
        task.started_at = Some(now);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn count_processing(&self, queue_id: &Uuid) -> Result<u64, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .values()
            .filter(|t| t.queue_id == *queue_id && t.status == TaskStatus::Processing)
            .count() as u64)
    }

    async fn queue_stats(&self, queue_id: &Uuid) -> Result<QueueStats, RepositoryError> {
        let name = self
            .queues
            .lock()
            .map_err(|_| RepositoryError::Connection)?
            .get(queue_id)
            .map(|q| q.name.clone())
            .unwrap_or_default();

        let tasks = self.tasks.lock().map_err(|_| RepositoryError::Connection)?;
        let mut stats = QueueStats {
            queue_name: name,
            ..Default::default()
        };
        for task in tasks.values().filter(|t| t.queue_id == *queue_id) {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn list_failed_tasks(
        &self,
        queue_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<QueueTask>, RepositoryError> {
        let tasks = self.tasks.lock().map_err(|_| RepositoryError::Connection)?;
        let mut failed: Vec<QueueTask> = tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Failed
                    && queue_id.is_none_or(|q| t.queue_id == *q)
            })
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        failed.truncate(limit as usize);
        Ok(failed)
    }
}
