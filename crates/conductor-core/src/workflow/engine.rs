//! Workflow engine: fixed-table state machine over a work request.
//!
//! The engine owns one `WorkRequest` and an append-only transition log.
//! Illegal transitions are rejected by return value -- `transition_to`
//! returns `false` and leaves state untouched, so callers can retry without
//! an error path. Forced transitions bypass the table and are flagged in the
//! log.
//!
//! Not internally synchronized: the caller must serialize transitions per
//! workflow ID.

use chrono::Utc;
use conductor_types::workflow::{TransitionRecord, WorkRequest, WorkflowState};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Legal next states for a given state.
///
/// Cancellation is reachable from every non-terminal state except `Failed`,
/// which instead admits only `Retrying`.
pub fn allowed_transitions(state: WorkflowState) -> &'static [WorkflowState] {
    use WorkflowState::*;
    match state {
        Initialized => &[Parsing, Cancelled],
        Parsing => &[Planning, Cancelled],
        Planning => &[ApprovalPending, Approved, Cancelled],
        ApprovalPending => &[Approved, Cancelled],
        Approved => &[Executing, Cancelled],
        Executing => &[Paused, Completed, Failed, Cancelled],
        Paused => &[Executing, Cancelled],
        Retrying => &[Executing, Cancelled],
        Failed => &[Retrying],
        Completed | Cancelled => &[],
    }
}

// ---------------------------------------------------------------------------
// StateInfo
// ---------------------------------------------------------------------------

/// Current state plus the set of currently-legal next states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateInfo {
    pub current: WorkflowState,
    pub allowed: Vec<WorkflowState>,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// State machine for one work request's lifecycle.
pub struct WorkflowEngine {
    request: WorkRequest,
    actor: String,
    history: Vec<TransitionRecord>,
}

impl WorkflowEngine {
    /// Take ownership of a request, set its state to `Initialized`, and reset
    /// the transition log.
    pub fn initialize(mut request: WorkRequest, actor: impl Into<String>) -> Self {
        request.state = WorkflowState::Initialized;
        request.updated_at = Utc::now();

        let actor = actor.into();
        tracing::info!(
            workflow_id = %request.id,
            actor = actor.as_str(),
            "workflow initialized"
        );

        Self {
            request,
            actor,
            history: Vec::new(),
        }
    }

    /// The request being driven.
    pub fn request(&self) -> &WorkRequest {
        &self.request
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkflowState {
        self.request.state
    }

    /// Attempt a transition to `target`.
    ///
    /// Returns `false` without mutating anything when the transition is not
    /// in the allowed table and `force` is not set. On success the state is
    /// updated and a `TransitionRecord` is appended.
    pub fn transition_to(&mut self, target: WorkflowState, reason: &str, force: bool) -> bool {
        let from = self.request.state;

        if !force && !allowed_transitions(from).contains(&target) {
            tracing::warn!(
                workflow_id = %self.request.id,
                from = ?from,
                to = ?target,
                "illegal transition rejected"
            );
            return false;
        }

        let now = Utc::now();
        self.request.state = target;
        self.request.updated_at = now;
        self.history.push(TransitionRecord {
            workflow_id: self.request.id,
            from_state: from,
            to_state: target,
            reason: reason.to_string(),
            forced: force,
            timestamp: now,
        });

        tracing::info!(
            workflow_id = %self.request.id,
            from = ?from,
            to = ?target,
            forced = force,
            reason,
            "workflow transition"
        );

        true
    }

    // -----------------------------------------------------------------------
    // Convenience transitions
    // -----------------------------------------------------------------------

    /// Executing -> Paused.
    pub fn pause(&mut self) -> bool {
        if self.request.state != WorkflowState::Executing {
            return false;
        }
        self.transition_to(WorkflowState::Paused, "paused", false)
    }

    /// Paused -> Executing.
    pub fn resume(&mut self) -> bool {
        if self.request.state != WorkflowState::Paused {
            return false;
        }
        self.transition_to(WorkflowState::Executing, "resumed", false)
    }

    /// Any non-terminal state -> Cancelled. Terminal and irreversible.
    pub fn cancel(&mut self, reason: &str) -> bool {
        if self.request.state.is_terminal() {
            return false;
        }
        self.transition_to(WorkflowState::Cancelled, reason, false)
    }

    /// Failed -> Retrying.
    pub fn retry(&mut self, reason: &str) -> bool {
        if self.request.state != WorkflowState::Failed {
            return false;
        }
        self.transition_to(WorkflowState::Retrying, reason, false)
    }

    /// Forced terminal transition to Completed.
    pub fn mark_completed(&mut self) -> bool {
        self.transition_to(WorkflowState::Completed, "completed", true)
    }

    /// Forced terminal transition to Failed, recording the error on the
    /// request.
    pub fn mark_failed(&mut self, error: &str) -> bool {
        self.request.error = Some(error.to_string());
        self.transition_to(WorkflowState::Failed, error, true)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// The ordered transition log since `initialize`.
    pub fn transition_history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Current state plus currently-legal next states.
    pub fn state_info(&self) -> StateInfo {
        StateInfo {
            current: self.request.state,
            allowed: allowed_transitions(self.request.state).to_vec(),
        }
    }

    /// The actor recorded at initialization.
    pub fn actor(&self) -> &str {
        &self.actor
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
