//! Plan execution: sequential step processing with checkpoints and gates.
//!
//! - `deps` -- dependency graph validation (unknown references, cycles)
//! - `step_executor` -- executes one plan step; collaborator ports and the
//!   explicit step-result type
//! - `service` -- drives a whole plan through the step executor and the
//!   checkpoint service, updating plan status

pub mod deps;
pub mod service;
pub mod step_executor;

pub use service::{ExecutionError, ExecutionReport, ExecutionService};
pub use step_executor::{
    ApprovalGateway, ApprovalRequest, StepDisposition, StepExecutor, StepFailure,
    StepFailureKind, StepHandler, StepOutcome,
};
