//! Execution service: drives an approved plan through its steps.
//!
//! Steps run strictly in declared order. Before each step the plan (and,
//! when linked, its parent work request) is checkpointed, so a failure can
//! roll back to the state immediately preceding the faulty step. Execution
//! halts on approval gates and resolves every runtime failure into a
//! `Failed` plan -- only setup-time validation errors propagate to the
//! caller.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use conductor_types::checkpoint::EntityKind;
use conductor_types::plan::{ExecutionProgress, Plan, PlanStatus, StepStatus};
use serde_json::json;
use uuid::Uuid;

use crate::checkpoint::{CheckpointError, CheckpointService};
use crate::repository::artifact::ArtifactRepository;
use crate::repository::checkpoint::CheckpointRepository;
use crate::repository::plan::PlanRepository;
use crate::repository::request::RequestRepository;
use crate::service::clock::Clock;

use super::deps::validate_dependencies;
use super::step_executor::{
    ApprovalGateway, StepDisposition, StepExecutor, StepFailure, StepHandler,
};

/// `created_by` recorded on checkpoints taken by this service.
const CHECKPOINT_AUTHOR: &str = "execution-service";

// ---------------------------------------------------------------------------
// ExecutionReport
// ---------------------------------------------------------------------------

/// Result of driving a plan (to completion, an approval halt, or failure).
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// The plan that was driven.
    pub plan_id: Uuid,
    /// Plan status when the drive ended.
    pub status: PlanStatus,
    /// IDs of steps completed so far, in plan order.
    pub completed_steps: Vec<String>,
    /// The gated step, when execution halted for approval.
    pub waiting_step: Option<String>,
    /// Error message, when the plan failed.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ExecutionService
// ---------------------------------------------------------------------------

/// Drives whole plans through the step executor and checkpoint service.
pub struct ExecutionService<P, R, C, A, H, G>
where
    P: PlanRepository,
    R: RequestRepository,
    C: CheckpointRepository,
    A: ArtifactRepository,
    H: StepHandler,
    G: ApprovalGateway,
{
    plans: P,
    requests: R,
    checkpoints: CheckpointService<C, P, R, A>,
    executor: StepExecutor<H, G>,
    clock: Arc<dyn Clock>,
}

impl<P, R, C, A, H, G> ExecutionService<P, R, C, A, H, G>
where
    P: PlanRepository,
    R: RequestRepository,
    C: CheckpointRepository,
    A: ArtifactRepository,
    H: StepHandler,
    G: ApprovalGateway,
{
    /// Create a new execution service.
    pub fn new(
        plans: P,
        requests: R,
        checkpoints: CheckpointService<C, P, R, A>,
        executor: StepExecutor<H, G>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plans,
            requests,
            checkpoints,
            executor,
            clock,
        }
    }

    /// Execute an approved plan from its current step cursor.
    ///
    /// # Errors
    ///
    /// Only setup-time problems surface as errors: an unknown plan, a plan
    /// that is not `Approved`, an empty or structurally invalid step list,
    /// and repository/checkpoint infrastructure failures. A step that fails
    /// at runtime resolves into a `Failed` plan inside an `Ok` report.
    pub async fn execute_plan(&self, plan_id: Uuid) -> Result<ExecutionReport, ExecutionError> {
        let mut plan = self
            .plans
            .get_plan(&plan_id)
            .await
            .map_err(|e| ExecutionError::Repository(e.to_string()))?
            .ok_or(ExecutionError::NotFound(plan_id))?;

        if plan.status != PlanStatus::Approved {
            return Err(ExecutionError::Validation(format!(
                "plan {} is not approved (status: {:?})",
                plan.id, plan.status
            )));
        }
        if plan.steps.is_empty() {
            return Err(ExecutionError::Validation(format!(
                "plan {} has no steps",
                plan.id
            )));
        }
        validate_dependencies(&plan.steps)
            .map_err(|e| ExecutionError::Validation(e.to_string()))?;

        let started = self.clock.now();
        let trace_id = format!("run-{}", Uuid::now_v7());

        plan.status = PlanStatus::InProgress;
        plan.updated_at = Utc::now();
        self.save_plan(&plan).await?;

        tracing::info!(
            plan_id = %plan.id,
            trace_id = trace_id.as_str(),
            steps = plan.steps.len(),
            "starting plan execution"
        );

        // Steps already completed count toward dependency resolution when a
        // plan is re-driven from a nonzero cursor.
        let mut completed: HashSet<String> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.step_id.clone())
            .collect();

        let total = plan.steps.len();
        let mut index = plan.current_step;

        while index < total {
            let step_id = plan.steps[index].step_id.clone();

            self.checkpoint_before_step(&plan, &step_id, &trace_id).await?;

            plan.steps[index].status = StepStatus::InProgress;
            plan.updated_at = Utc::now();
            self.save_plan(&plan).await?;

            match self.executor.execute(&plan, index, &completed).await {
                StepDisposition::Completed { outputs } => {
                    let step = &mut plan.steps[index];
                    step.status = StepStatus::Completed;
                    step.outputs.extend(outputs);
                    step.error = None;
                    completed.insert(step_id.clone());
                    plan.current_step = index + 1;
                    plan.updated_at = Utc::now();
                    self.save_plan(&plan).await?;

                    tracing::debug!(plan_id = %plan.id, step_id = step_id.as_str(), "step completed");
                    index += 1;
                }
                StepDisposition::Skipped { reason } => {
                    plan.steps[index].status = StepStatus::Skipped;
                    plan.current_step = index + 1;
                    plan.updated_at = Utc::now();
                    self.save_plan(&plan).await?;

                    tracing::warn!(
                        plan_id = %plan.id,
                        step_id = step_id.as_str(),
                        reason = reason.as_str(),
                        "step skipped"
                    );
                    index += 1;
                }
                StepDisposition::WaitingApproval { approval_id } => {
                    let step = &mut plan.steps[index];
                    step.status = StepStatus::WaitingApproval;
                    step.outputs
                        .insert("approval_request_id".to_string(), json!(approval_id));
                    plan.status = PlanStatus::WaitingApproval;
                    plan.updated_at = Utc::now();
                    self.save_plan(&plan).await?;

                    tracing::info!(
                        plan_id = %plan.id,
                        step_id = step_id.as_str(),
                        "plan halted pending approval"
                    );
                    return Ok(ExecutionReport {
                        plan_id: plan.id,
                        status: PlanStatus::WaitingApproval,
                        completed_steps: completed_in_order(&plan),
                        waiting_step: Some(step_id),
                        error: None,
                    });
                }
                StepDisposition::Failed(failure) => {
                    return self.fail_plan(plan, index, failure).await;
                }
            }
        }

        plan.status = PlanStatus::Completed;
        plan.current_step = total;
        let elapsed = (self.clock.now() - started).num_seconds().max(0) as u64;
        plan.actual_duration_secs = Some(elapsed);
        plan.updated_at = Utc::now();
        self.save_plan(&plan).await?;

        tracing::info!(
            plan_id = %plan.id,
            duration_secs = elapsed,
            "plan execution completed"
        );

        Ok(ExecutionReport {
            plan_id: plan.id,
            status: PlanStatus::Completed,
            completed_steps: completed_in_order(&plan),
            waiting_step: None,
            error: None,
        })
    }

    /// Progress snapshot for a plan.
    pub async fn execution_status(
        &self,
        plan_id: Uuid,
    ) -> Result<ExecutionProgress, ExecutionError> {
        let plan = self
            .plans
            .get_plan(&plan_id)
            .await
            .map_err(|e| ExecutionError::Repository(e.to_string()))?
            .ok_or(ExecutionError::NotFound(plan_id))?;

        let total = plan.steps.len();
        let progress = if total == 0 {
            0.0
        } else {
            plan.current_step as f64 / total as f64
        };

        Ok(ExecutionProgress {
            status: plan.status,
            current_step: plan.current_step,
            total_steps: total,
            progress,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn save_plan(&self, plan: &Plan) -> Result<(), ExecutionError> {
        self.plans
            .save_plan(plan)
            .await
            .map_err(|e| ExecutionError::Repository(e.to_string()))
    }

    /// Checkpoint the plan, and its parent work request when linked, before a
    /// step runs. Both snapshots must be durable before the step starts.
    async fn checkpoint_before_step(
        &self,
        plan: &Plan,
        step_id: &str,
        trace_id: &str,
    ) -> Result<(), ExecutionError> {
        let snapshot = serde_json::to_value(plan)
            .map_err(|e| ExecutionError::Checkpoint(CheckpointError::Payload(e.to_string())))?;
        self.checkpoints
            .create_checkpoint(
                EntityKind::Plan,
                plan.id,
                snapshot,
                &format!("pre-step {step_id}"),
                CHECKPOINT_AUTHOR,
                Some(trace_id.to_string()),
            )
            .await?;

        if let Some(request_id) = plan.request_id {
            match self.requests.get_request(&request_id).await {
                Ok(Some(request)) => {
                    let snapshot = serde_json::to_value(&request).map_err(|e| {
                        ExecutionError::Checkpoint(CheckpointError::Payload(e.to_string()))
                    })?;
                    self.checkpoints
                        .create_checkpoint(
                            EntityKind::Task,
                            request_id,
                            snapshot,
                            &format!("pre-step {step_id}"),
                            CHECKPOINT_AUTHOR,
                            Some(trace_id.to_string()),
                        )
                        .await?;
                }
                Ok(None) => {
                    tracing::warn!(
                        plan_id = %plan.id,
                        request_id = %request_id,
                        "linked work request not found, skipping its checkpoint"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        plan_id = %plan.id,
                        request_id = %request_id,
                        error = %e,
                        "failed to load linked work request for checkpointing"
                    );
                }
            }
        }

        Ok(())
    }

    /// Resolve a step failure: attempt rollback to the pre-step checkpoint,
    /// then record the failed step and the `Failed` plan status on top of the
    /// restored state.
    async fn fail_plan(
        &self,
        plan: Plan,
        index: usize,
        failure: StepFailure,
    ) -> Result<ExecutionReport, ExecutionError> {
        let step_id = plan.steps[index].step_id.clone();

        tracing::error!(
            plan_id = %plan.id,
            step_id = step_id.as_str(),
            kind = ?failure.kind,
            error = failure.message.as_str(),
            "step failed, failing plan"
        );

        if let Err(e) = self
            .checkpoints
            .rollback_entity(EntityKind::Plan, plan.id, None)
            .await
        {
            tracing::warn!(plan_id = %plan.id, error = %e, "rollback attempt failed");
        }

        // Re-read: rollback may have restored the stored plan.
        let mut failed = self
            .plans
            .get_plan(&plan.id)
            .await
            .map_err(|e| ExecutionError::Repository(e.to_string()))?
            .unwrap_or(plan);

        if let Some(step) = failed.steps.get_mut(index) {
            step.status = StepStatus::Failed;
            step.error = Some(failure.message.clone());
        }
        failed.status = PlanStatus::Failed;
        failed.updated_at = Utc::now();
        self.save_plan(&failed).await?;

        Ok(ExecutionReport {
            plan_id: failed.id,
            status: PlanStatus::Failed,
            completed_steps: completed_in_order(&failed),
            waiting_step: None,
            error: Some(failure.message),
        })
    }
}

/// Completed step IDs in plan order.
fn completed_in_order(plan: &Plan) -> Vec<String> {
    plan.steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .map(|s| s.step_id.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// ExecutionError
// ---------------------------------------------------------------------------

/// Errors surfaced to `execute_plan` callers.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Precondition failure: unapproved plan, empty or invalid step list.
    #[error("validation error: {0}")]
    Validation(String),

    /// Plan ID does not exist.
    #[error("plan not found: {0}")]
    NotFound(Uuid),

    /// Underlying repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// Checkpoint creation or restore failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
