//! Plan and step types for Conductor.
//!
//! A plan is an ordered, dependency-annotated list of steps produced by an
//! external planner. The execution service consumes it only once approved.
//! Steps carry typed kinds, declared dependencies, and accumulated
//! inputs/outputs.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// An approved, ordered set of steps carrying a request to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// UUIDv7 plan ID.
    pub id: Uuid,
    /// Parent work request, when this plan was produced for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    /// What the plan is meant to achieve.
    pub goal: String,
    /// Ordered step list. Execution follows declared order strictly.
    pub steps: Vec<PlanStep>,
    /// Index of the next step to execute.
    pub current_step: usize,
    /// Current plan status.
    pub status: PlanStatus,
    /// Revision counter, bumped by the planner on re-plans.
    pub version: u32,
    /// Planner's duration estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_secs: Option<u64>,
    /// Wall-clock duration recorded after execution finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration_secs: Option<u64>,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the plan was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Overall status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
    InProgress,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

// ---------------------------------------------------------------------------
// PlanStep
// ---------------------------------------------------------------------------

/// A single step within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Planner-assigned step ID (e.g. "update-schema"). Unique within a plan.
    pub step_id: String,
    /// The kind of step.
    pub kind: StepKind,
    /// Human-readable description of the work.
    pub description: String,
    /// Step IDs that must be `Completed` before this step may run.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Current step status.
    pub status: StepStatus,
    /// Whether a human approval gate precedes execution of this step.
    #[serde(default)]
    pub approval_required: bool,
    /// Step inputs (planner-provided parameters).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, serde_json::Value>,
    /// Step outputs (accumulated during execution).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub outputs: HashMap<String, serde_json::Value>,
    /// Error message when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The kind of work a step performs.
///
/// Dispatch over this enum is a closed, exhaustive match. Wire values outside
/// the known set deserialize to `Unknown`, which the executor marks as
/// skipped rather than failing the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Effectful work delegated to the step-execution collaborator.
    Action,
    /// Branch selection recorded from step inputs.
    Decision,
    /// Assertion over dependency outputs.
    Validation,
    /// Unrecognized kind from an older or newer planner.
    #[serde(other)]
    Unknown,
}

/// Status of an individual plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    WaitingApproval,
    Skipped,
}

impl PlanStep {
    /// Create a pending step with the given ID and kind.
    pub fn new(step_id: impl Into<String>, kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            kind,
            description: description.into(),
            dependencies: BTreeSet::new(),
            status: StepStatus::Pending,
            approval_required: false,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionProgress
// ---------------------------------------------------------------------------

/// Snapshot of a plan's execution progress, as reported by the execution
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    /// Current plan status.
    pub status: PlanStatus,
    /// Index of the next step to execute.
    pub current_step: usize,
    /// Total number of steps in the plan.
    pub total_steps: usize,
    /// Fraction of steps completed, in `[0.0, 1.0]`.
    pub progress: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
