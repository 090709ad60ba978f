//! Infrastructure implementations for Conductor.
//!
//! Implements the repository and service ports defined in `conductor-core`:
//! SQLite persistence via sqlx, SHA-256 content hashing, the system clock,
//! and the TOML configuration loader.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod sqlite;
