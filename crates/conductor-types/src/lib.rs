//! Shared domain types for Conductor.
//!
//! This crate contains the core domain types used across the orchestration
//! engine: workflow lifecycle states, plans and steps, checkpoints, queue
//! tasks, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod artifact;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod plan;
pub mod queue;
pub mod workflow;
