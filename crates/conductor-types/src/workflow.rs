//! Workflow lifecycle types for Conductor.
//!
//! Defines the finite set of states a work request moves through, the
//! append-only transition record kept by the engine, and the work request
//! entity itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Lifecycle state of a work request.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal. All other transitions
/// are constrained by the engine's allowed-transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Initialized,
    Parsing,
    Planning,
    ApprovalPending,
    Approved,
    Executing,
    Paused,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    /// Whether this state admits no further transitions (except forced ones).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

// ---------------------------------------------------------------------------
// TransitionRecord
// ---------------------------------------------------------------------------

/// One entry in a workflow's append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The work request this transition belongs to.
    pub workflow_id: Uuid,
    /// State before the transition.
    pub from_state: WorkflowState,
    /// State after the transition.
    pub to_state: WorkflowState,
    /// Human-readable reason supplied by the caller.
    pub reason: String,
    /// Whether the transition bypassed the allowed-transition table.
    pub forced: bool,
    /// When the transition was applied.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkRequest
// ---------------------------------------------------------------------------

/// The top-level unit of work tracked by the workflow engine.
///
/// A request is created by the surrounding system, carried through the state
/// machine, and linked to the plan produced for it by the external planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    /// UUIDv7 request ID.
    pub id: Uuid,
    /// Short description of what was asked for.
    pub summary: String,
    /// Current lifecycle state.
    pub state: WorkflowState,
    /// The plan produced for this request, once planning has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<Uuid>,
    /// Error message when the request ended in `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request was last updated.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_state_serde() {
        for state in [
            WorkflowState::Initialized,
            WorkflowState::Parsing,
            WorkflowState::Planning,
            WorkflowState::ApprovalPending,
            WorkflowState::Approved,
            WorkflowState::Executing,
            WorkflowState::Paused,
            WorkflowState::Retrying,
            WorkflowState::Completed,
            WorkflowState::Failed,
            WorkflowState::Cancelled,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            let parsed: WorkflowState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_workflow_state_snake_case_wire_format() {
        let json = serde_json::to_string(&WorkflowState::ApprovalPending).unwrap();
        assert_eq!(json, "\"approval_pending\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowState::Completed.is_terminal());
        assert!(WorkflowState::Failed.is_terminal());
        assert!(WorkflowState::Cancelled.is_terminal());
        assert!(!WorkflowState::Executing.is_terminal());
        assert!(!WorkflowState::Retrying.is_terminal());
        assert!(!WorkflowState::Initialized.is_terminal());
    }

    #[test]
    fn test_transition_record_json_roundtrip() {
        let record = TransitionRecord {
            workflow_id: Uuid::now_v7(),
            from_state: WorkflowState::Executing,
            to_state: WorkflowState::Paused,
            reason: "operator pause".to_string(),
            forced: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.from_state, WorkflowState::Executing);
        assert_eq!(parsed.to_state, WorkflowState::Paused);
        assert!(!parsed.forced);
    }

    #[test]
    fn test_work_request_json_roundtrip() {
        let request = WorkRequest {
            id: Uuid::now_v7(),
            summary: "refactor billing module".to_string(),
            state: WorkflowState::Approved,
            plan_id: Some(Uuid::now_v7()),
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: WorkRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.summary, "refactor billing module");
        assert_eq!(parsed.state, WorkflowState::Approved);
        assert!(parsed.plan_id.is_some());
    }
}
