//! ContentHasher trait for computing integrity hashes.
//!
//! Defined in conductor-core so the checkpoint service can hash payloads
//! without coupling to a specific hashing algorithm. The `Sha256ContentHasher`
//! adapter lives in conductor-infra.

/// Abstraction over content hashing for integrity verification.
///
/// Used by the checkpoint service to hash canonical checkpoint payloads and
/// verify them on restore.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}
