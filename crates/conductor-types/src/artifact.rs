//! Artifact types.
//!
//! Artifacts are versioned outputs produced by plan steps (reports, generated
//! files, structured results). They are one of the entity kinds the
//! checkpoint service can roll back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A versioned output produced during plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// UUIDv7 artifact ID.
    pub id: Uuid,
    /// The plan whose execution produced this artifact.
    pub plan_id: Uuid,
    /// Artifact name, unique within a plan.
    pub name: String,
    /// Artifact payload.
    pub content: serde_json::Value,
    /// Revision counter, bumped on each overwrite.
    pub version: u32,
    /// When the artifact was first created.
    pub created_at: DateTime<Utc>,
    /// When the artifact was last written.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifact_json_roundtrip() {
        let artifact = Artifact {
            id: Uuid::now_v7(),
            plan_id: Uuid::now_v7(),
            name: "migration-report".to_string(),
            content: json!({"tables": 4, "rows_moved": 1280}),
            version: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json_str = serde_json::to_string(&artifact).unwrap();
        let parsed: Artifact = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.name, "migration-report");
        assert_eq!(parsed.version, 3);
    }
}
