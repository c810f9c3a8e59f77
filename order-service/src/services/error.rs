use service_core::error::AppError;
use thiserror::Error;

use super::repository::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SlotConflict(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Payment verification error: {0}")]
    PaymentVerification(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            ServiceError::SlotConflict(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::PaymentProvider(e) => AppError::BadGateway(e),
            ServiceError::PaymentVerification(e) => AppError::BadGateway(e),
            ServiceError::Forbidden(e) => AppError::Forbidden(anyhow::anyhow!(e)),
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
