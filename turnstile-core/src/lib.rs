pub mod models;
pub mod repository;
pub mod payment;
pub mod notify;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {key}")]
    NotFoundError {
        entity: &'static str,
        key: String,
    },
    #[error("Not enough capacity available. Requested: {requested}, Available: {remaining}")]
    CapacityExceeded {
        requested: i32,
        remaining: i32,
    },
    #[error("Payment already completed for booking {0}")]
    AlreadyPaid(Uuid),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        from: String,
        to: String,
    },
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        CoreError::NotFoundError {
            entity,
            key: key.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
