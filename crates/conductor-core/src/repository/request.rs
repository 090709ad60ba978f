//! Work-request repository trait definition.

use conductor_types::error::RepositoryError;
use conductor_types::workflow::WorkRequest;
use uuid::Uuid;

/// Repository trait for work-request persistence.
pub trait RequestRepository: Send + Sync {
    /// Upsert a work request (insert or replace by ID).
    fn save_request(
        &self,
        request: &WorkRequest,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a work request by its UUID.
    fn get_request(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkRequest>, RepositoryError>> + Send;
}
