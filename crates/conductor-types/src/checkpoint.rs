//! Checkpoint types for crash-safe state snapshots.
//!
//! A checkpoint is an immutable snapshot of an entity's state plus a content
//! hash over its canonical serialization. Restore recomputes the hash and
//! refuses to hand back tampered or corrupted payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The kind of entity a checkpoint snapshots.
///
/// Rollback applies a kind-specific field mapping. Values outside the known
/// set deserialize to `Unknown`; rollback logs a warning for those and
/// performs no mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Plan,
    Task,
    Artifact,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// An immutable, hash-verified snapshot of an entity's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// UUIDv7 checkpoint ID.
    pub id: Uuid,
    /// Kind of the snapshotted entity.
    pub entity_kind: EntityKind,
    /// ID of the snapshotted entity.
    pub entity_id: Uuid,
    /// Opaque serialized entity state.
    pub state_data: serde_json::Value,
    /// SHA-256 hex digest over the canonical serialization of `state_data`.
    pub state_hash: String,
    /// Why this checkpoint was taken (e.g. "pre-step apply-migration").
    pub reason: String,
    /// Component or actor that created the checkpoint.
    pub created_by: String,
    /// Correlates the checkpoint with an execution trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// When the checkpoint was written. Records are never updated after this.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
