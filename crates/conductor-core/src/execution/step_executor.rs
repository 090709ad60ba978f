//! Step executor: runs one plan step, respecting dependencies and gates.
//!
//! Dispatch over `StepKind` is a closed, exhaustive match. Failures never
//! unwind out of the executor -- every outcome, including collaborator
//! errors, is resolved into a `StepDisposition` carrying a structured
//! {kind, message} on failure, so the orchestration loop never relies on
//! error propagation for normal failure paths.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use conductor_types::plan::{Plan, PlanStep, StepKind};
use serde_json::{Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Collaborator ports
// ---------------------------------------------------------------------------

/// Result shape returned by the step-execution collaborator.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the collaborator considers the step to have succeeded.
    pub success: bool,
    /// Output payload produced by the step.
    pub output: Option<Value>,
    /// Error description when `success` is false.
    pub error: Option<String>,
}

impl StepOutcome {
    /// A successful outcome with the given output payload.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    /// A failed outcome with the given error description.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Errors raised by the step-execution collaborator itself (as opposed to a
/// step that ran and reported failure).
#[derive(Debug, thiserror::Error)]
pub enum StepHandlerError {
    /// The handler ran and hit an unrecoverable error.
    #[error("step handler failure: {0}")]
    Failed(String),

    /// The handler could not be reached at all.
    #[error("step handler unavailable: {0}")]
    Unavailable(String),
}

/// External collaborator that performs the effectful work of `Action` steps.
pub trait StepHandler: Send + Sync {
    /// Execute one action step and report its outcome.
    fn run(
        &self,
        plan_id: Uuid,
        step: &PlanStep,
    ) -> impl std::future::Future<Output = Result<StepOutcome, StepHandlerError>> + Send;
}

/// An approval request created for a gated step.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub step_id: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Errors from the approval collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval gateway unavailable: {0}")]
    Unavailable(String),
}

/// External collaborator that records approval requests for gated steps.
///
/// Resolution happens out of band; execution halts until the surrounding
/// system re-drives the plan.
pub trait ApprovalGateway: Send + Sync {
    /// Create an approval request for a step.
    fn request_approval(
        &self,
        plan_id: Uuid,
        step_id: &str,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<ApprovalRequest, ApprovalError>> + Send;
}

// ---------------------------------------------------------------------------
// StepDisposition
// ---------------------------------------------------------------------------

/// How a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailureKind {
    /// A declared dependency had not completed.
    Dependency,
    /// The step ran (or was dispatched) and failed.
    Execution,
    /// A validation step's assertion did not hold.
    Validation,
}

/// Structured failure result for a step.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub kind: StepFailureKind,
    pub message: String,
}

/// The resolved result of executing one step.
#[derive(Debug, Clone)]
pub enum StepDisposition {
    /// Step finished; outputs to merge into the step record.
    Completed { outputs: HashMap<String, Value> },
    /// Step is gated; an approval request was created and execution halts.
    WaitingApproval { approval_id: Uuid },
    /// Step kind is not recognized; non-fatal.
    Skipped { reason: String },
    /// Step failed; the plan must be failed.
    Failed(StepFailure),
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Executes individual plan steps against the collaborator ports.
pub struct StepExecutor<H: StepHandler, G: ApprovalGateway> {
    handler: H,
    approvals: G,
}

impl<H: StepHandler, G: ApprovalGateway> StepExecutor<H, G> {
    /// Create a step executor over the given collaborators.
    pub fn new(handler: H, approvals: G) -> Self {
        Self { handler, approvals }
    }

    /// Execute the step at `index` within `plan`.
    ///
    /// `completed` is the set of step IDs that finished successfully in the
    /// current run. Order of checks: dependencies first (an unmet dependency
    /// fails the step without executing it), then the approval gate, then
    /// kind dispatch.
    pub async fn execute(
        &self,
        plan: &Plan,
        index: usize,
        completed: &HashSet<String>,
    ) -> StepDisposition {
        let Some(step) = plan.steps.get(index) else {
            return StepDisposition::Failed(StepFailure {
                kind: StepFailureKind::Execution,
                message: format!("step index {index} out of bounds"),
            });
        };

        let missing: Vec<&String> = step
            .dependencies
            .iter()
            .filter(|dep| !completed.contains(*dep))
            .collect();
        if !missing.is_empty() {
            let message = format!(
                "unmet dependencies for step '{}': {}",
                step.step_id,
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            tracing::warn!(
                plan_id = %plan.id,
                step_id = step.step_id.as_str(),
                message = message.as_str(),
                "dependency check failed"
            );
            return StepDisposition::Failed(StepFailure {
                kind: StepFailureKind::Dependency,
                message,
            });
        }

        if step.approval_required {
            return match self
                .approvals
                .request_approval(plan.id, &step.step_id, &step.description)
                .await
            {
                Ok(request) => {
                    tracing::info!(
                        plan_id = %plan.id,
                        step_id = step.step_id.as_str(),
                        approval_id = %request.id,
                        "approval requested, halting execution"
                    );
                    StepDisposition::WaitingApproval {
                        approval_id: request.id,
                    }
                }
                Err(e) => StepDisposition::Failed(StepFailure {
                    kind: StepFailureKind::Execution,
                    message: format!("approval request failed: {e}"),
                }),
            };
        }

        match step.kind {
            StepKind::Action => self.run_action(plan.id, step).await,
            StepKind::Decision => Self::run_decision(step),
            StepKind::Validation => Self::run_validation(plan, step),
            StepKind::Unknown => StepDisposition::Skipped {
                reason: "unrecognized step kind".to_string(),
            },
        }
    }

    /// Delegate an action step to the step-execution collaborator.
    ///
    /// Collaborator errors and failed outcomes both resolve to a structured
    /// failure; nothing propagates.
    async fn run_action(&self, plan_id: Uuid, step: &PlanStep) -> StepDisposition {
        match self.handler.run(plan_id, step).await {
            Ok(outcome) if outcome.success => {
                let mut outputs = HashMap::new();
                match outcome.output {
                    // Object outputs merge field-by-field into the step record.
                    Some(Value::Object(map)) => {
                        outputs.extend(map);
                    }
                    Some(other) => {
                        outputs.insert("result".to_string(), other);
                    }
                    None => {}
                }
                StepDisposition::Completed { outputs }
            }
            Ok(outcome) => StepDisposition::Failed(StepFailure {
                kind: StepFailureKind::Execution,
                message: outcome
                    .error
                    .unwrap_or_else(|| "step reported failure without detail".to_string()),
            }),
            Err(e) => StepDisposition::Failed(StepFailure {
                kind: StepFailureKind::Execution,
                message: e.to_string(),
            }),
        }
    }

    /// Resolve a decision step from its declared inputs.
    ///
    /// The planner supplies either an explicit `choice` or a `branches` list
    /// whose first entry is the default.
    fn run_decision(step: &PlanStep) -> StepDisposition {
        let chosen = step.inputs.get("choice").cloned().or_else(|| {
            step.inputs
                .get("branches")
                .and_then(|b| b.as_array())
                .and_then(|arr| arr.first())
                .cloned()
        });

        match chosen {
            Some(value) => {
                let mut outputs = HashMap::new();
                outputs.insert("decision".to_string(), value);
                StepDisposition::Completed { outputs }
            }
            None => StepDisposition::Failed(StepFailure {
                kind: StepFailureKind::Execution,
                message: format!(
                    "decision step '{}' declares no 'choice' or 'branches' input",
                    step.step_id
                ),
            }),
        }
    }

    /// Assert that the steps named in `inputs.expect` (defaulting to the
    /// step's own dependencies) produced non-empty outputs.
    fn run_validation(plan: &Plan, step: &PlanStep) -> StepDisposition {
        let expected: Vec<String> = step
            .inputs
            .get("expect")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_else(|| step.dependencies.iter().cloned().collect());

        for name in &expected {
            let produced = plan
                .steps
                .iter()
                .find(|s| s.step_id == *name)
                .is_some_and(|s| !s.outputs.is_empty());
            if !produced {
                return StepDisposition::Failed(StepFailure {
                    kind: StepFailureKind::Validation,
                    message: format!(
                        "validation step '{}' expected output from '{}' but found none",
                        step.step_id, name
                    ),
                });
            }
        }

        let mut outputs = HashMap::new();
        outputs.insert("validated".to_string(), json!(expected));
        StepDisposition::Completed { outputs }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
