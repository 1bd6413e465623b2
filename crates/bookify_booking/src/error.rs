use bookify_availability::AvailabilityError;
use bookify_common::BookifyError;
use bookify_db::DbError;
use thiserror::Error;
use uuid::Uuid;

/// Reasons a booking is refused. Conflicts are returned as-is and never retried.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Bookings are disabled for event {0}")]
    BookingsDisabled(Uuid),

    #[error("Calendar event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Provider not found: {0}")]
    ProviderNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<AvailabilityError> for BookingError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::InvalidInput(msg) => BookingError::InvalidInput(msg),
            AvailabilityError::ProviderNotFound(id) => BookingError::ProviderNotFound(id),
            AvailabilityError::Database(db) => BookingError::Database(db),
        }
    }
}

impl From<BookingError> for BookifyError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotUnavailable(_) => BookifyError::ConflictError(err.to_string()),
            BookingError::BookingsDisabled(_) | BookingError::InvalidInput(_) => {
                BookifyError::ValidationError(err.to_string())
            }
            BookingError::EventNotFound(_)
            | BookingError::BookingNotFound(_)
            | BookingError::ProviderNotFound(_) => BookifyError::NotFoundError(err.to_string()),
            BookingError::Database(db) => db.into(),
        }
    }
}
