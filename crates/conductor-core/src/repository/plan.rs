//! Plan repository trait definition.
//!
//! Plans arrive from an external planner and are persisted as whole
//! documents; the execution service reads, mutates, and saves them back as it
//! advances through steps.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use conductor_types::error::RepositoryError;
use conductor_types::plan::{Plan, PlanStatus};
use uuid::Uuid;

/// Repository trait for plan persistence.
pub trait PlanRepository: Send + Sync {
    /// Upsert a plan (insert or replace by ID).
    fn save_plan(
        &self,
        plan: &Plan,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a plan by its UUID.
    fn get_plan(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Plan>, RepositoryError>> + Send;

    /// List plans, optionally filtered by status, newest first.
    fn list_plans(
        &self,
        status: Option<PlanStatus>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Plan>, RepositoryError>> + Send;

    /// Delete a plan by ID. Returns `true` if it existed.
    fn delete_plan(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
