//! Workflow state machine.
//!
//! - `engine` -- the fixed-table state machine driving a work request's
//!   lifecycle, with an append-only transition log.

pub mod engine;
