//! Cross-layer tests: core services wired over the SQLite repositories.

use std::sync::Arc;

use chrono::Utc;
use conductor_core::checkpoint::CheckpointService;
use conductor_core::execution::{
    ApprovalGateway, ExecutionService, StepExecutor, StepHandler, StepOutcome,
};
use conductor_core::execution::step_executor::{ApprovalError, ApprovalRequest, StepHandlerError};
use conductor_core::queue::TaskQueueManager;
use conductor_core::repository::plan::PlanRepository;
use conductor_types::checkpoint::EntityKind;
use conductor_types::config::RetryPolicy;
use conductor_types::plan::{Plan, PlanStatus, PlanStep, StepKind, StepStatus};
use conductor_types::queue::TaskStatus;
use serde_json::json;
use uuid::Uuid;

use crate::clock::SystemClock;
use crate::crypto::hash::Sha256ContentHasher;

use super::artifact::SqliteArtifactRepository;
use super::checkpoint::SqliteCheckpointRepository;
use super::plan::SqlitePlanRepository;
use super::pool::DatabasePool;
use super::queue::SqliteQueueRepository;
use super::request::SqliteRequestRepository;

struct FlakyHandler {
    fail_step: Option<String>,
}

impl StepHandler for FlakyHandler {
    async fn run(&self, _plan_id: Uuid, step: &PlanStep) -> Result<StepOutcome, StepHandlerError> {
        if self.fail_step.as_deref() == Some(step.step_id.as_str()) {
            return Err(StepHandlerError::Failed("simulated crash".to_string()));
        }
        Ok(StepOutcome::ok(json!({"ran": step.step_id})))
    }
}

struct NoopGateway;

impl ApprovalGateway for NoopGateway {
    async fn request_approval(
        &self,
        plan_id: Uuid,
        step_id: &str,
        prompt: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        Ok(ApprovalRequest {
            id: Uuid::now_v7(),
            plan_id,
            step_id: step_id.to_string(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        })
    }
}

type SqliteExecutionService = ExecutionService<
    SqlitePlanRepository,
    SqliteRequestRepository,
    SqliteCheckpointRepository,
    SqliteArtifactRepository,
    FlakyHandler,
    NoopGateway,
>;

async fn execution_service(
    fail_step: Option<&str>,
) -> (tempfile::TempDir, DatabasePool, SqliteExecutionService) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = DatabasePool::new(&url).await.unwrap();

    let checkpoint_service = CheckpointService::new(
        SqliteCheckpointRepository::new(pool.clone()),
        SqlitePlanRepository::new(pool.clone()),
        SqliteRequestRepository::new(pool.clone()),
        SqliteArtifactRepository::new(pool.clone()),
        Arc::new(Sha256ContentHasher::new()),
    );
    let service = ExecutionService::new(
        SqlitePlanRepository::new(pool.clone()),
        SqliteRequestRepository::new(pool.clone()),
        checkpoint_service,
        StepExecutor::new(
            FlakyHandler {
                fail_step: fail_step.map(str::to_string),
            },
            NoopGateway,
        ),
        Arc::new(SystemClock::new()),
    );

    (dir, pool, service)
}

fn make_plan(steps: Vec<PlanStep>) -> Plan {
    Plan {
        id: Uuid::now_v7(),
        request_id: None,
        goal: "integration".to_string(),
        steps,
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
async fn test_plan_runs_to_completion_over_sqlite() {
    let (_dir, pool, service) = execution_service(None).await;
    let plans = SqlitePlanRepository::new(pool.clone());

    let mut check = PlanStep::new("check", StepKind::Validation, "verify build output");
    check.dependencies.insert("build".to_string());
    let plan = make_plan(vec![
        PlanStep::new("build", StepKind::Action, "build it"),
        check,
    ]);
    plans.save_plan(&plan).await.unwrap();

    let report = service.execute_plan(plan.id).await.unwrap();
    assert_eq!(report.status, PlanStatus::Completed);
    assert_eq!(report.completed_steps, vec!["build", "check"]);

    let stored = plans.get_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Completed);
    assert!(stored.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert!(stored.actual_duration_secs.is_some());
}

#[tokio::test]
async fn test_failure_rolls_back_through_sqlite_checkpoints() {
    let (_dir, pool, service) = execution_service(Some("second")).await;
    let plans = SqlitePlanRepository::new(pool.clone());
    let checkpoints = SqliteCheckpointRepository::new(pool.clone());

    let plan = make_plan(vec![
        PlanStep::new("first", StepKind::Action, "ok"),
        PlanStep::new("second", StepKind::Action, "crashes"),
        PlanStep::new("third", StepKind::Action, "never runs"),
    ]);
    plans.save_plan(&plan).await.unwrap();

    let report = service.execute_plan(plan.id).await.unwrap();
    assert_eq!(report.status, PlanStatus::Failed);
    assert!(report.error.as_deref().unwrap_or_default().contains("simulated crash"));

    let stored = plans.get_plan(&plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PlanStatus::Failed);
    assert_eq!(stored.current_step, 1);
    assert_eq!(stored.steps[0].status, StepStatus::Completed);
    assert_eq!(stored.steps[1].status, StepStatus::Failed);
    assert_eq!(stored.steps[2].status, StepStatus::Pending);

    use conductor_core::repository::checkpoint::CheckpointRepository;
    let latest = checkpoints
        .latest_for_entity(EntityKind::Plan, &plan.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.reason, "pre-step second");
}

#[tokio::test]
async fn test_queue_lifecycle_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let pool = DatabasePool::new(&url).await.unwrap();

    let manager = TaskQueueManager::new(
        SqliteQueueRepository::new(pool.clone()),
        RetryPolicy::default(),
        Arc::new(SystemClock::new()),
    );

    manager.create_queue("render", 1, 5).await.unwrap();
    let low = manager
        .add_task("render", "page", json!({"page": 2}), 1, 2)
        .await
        .unwrap();
    let high = manager
        .add_task("render", "page", json!({"page": 1}), 9, 2)
        .await
        .unwrap();

    // Priority 9 first; admission control refuses a second lease.
    let first = manager.get_next_task("render", "w1").await.unwrap().unwrap();
    assert_eq!(first.id, high.id);
    assert!(manager.get_next_task("render", "w2").await.unwrap().is_none());

    manager.complete_task(first.id, Some(json!({"ok": true}))).await.unwrap();

    let second = manager.get_next_task("render", "w2").await.unwrap().unwrap();
    assert_eq!(second.id, low.id);

    // Failing with retry schedules backoff; the task is not yet eligible.
    let failed = manager.fail_task(second.id, "render timeout", true).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Queued);
    assert!(failed.next_retry_at.is_some());
    assert!(manager.get_next_task("render", "w2").await.unwrap().is_none());

    let stats = manager.get_queue_stats("render").await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 1);
}
