//! Checkpoint service: content-addressed snapshots and verified restore.
//!
//! - `canonical` -- deterministic JSON serialization (recursive key sort)
//! - `service` -- checkpoint creation, hash-verified restore, and
//!   kind-dispatched entity rollback

pub mod canonical;
pub mod service;

pub use service::{CheckpointError, CheckpointService};
