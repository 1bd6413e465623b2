use bookify_common::BookifyError;
use bookify_db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<AvailabilityError> for BookifyError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidInput(msg) => BookifyError::ValidationError(msg),
            AvailabilityError::ProviderNotFound(_) => BookifyError::NotFoundError(err.to_string()),
            AvailabilityError::Database(db) => db.into(),
        }
    }
}
