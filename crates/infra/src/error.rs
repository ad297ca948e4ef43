use thiserror::Error;

use equiplend_auth::AuthzError;
use equiplend_core::DomainError;

use crate::store::StoreError;

/// Error returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    /// Storage failed for reasons unrelated to the request.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(e) => ServiceError::Domain(e),
            StoreError::Backend(msg) => ServiceError::Persistence(msg),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
