//! Error type for sync and connection operations

use bookify_calendar::AdapterError;
use bookify_common::BookifyError;
use bookify_db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection was deactivated and waits for the provider to reconnect.
    #[error("Calendar connection {0} requires reauthorization")]
    ReauthRequired(Uuid),

    #[error("Calendar credentials rejected: {0}")]
    AuthExpired(String),

    #[error("Calendar platform unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Calendar connection not found: {0}")]
    ConnectionNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unreadable payloads and unsupported operations.
    #[error("Calendar adapter error: {0}")]
    Adapter(AdapterError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<AdapterError> for SyncError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::AuthExpired(msg) => SyncError::AuthExpired(msg),
            AdapterError::RemoteUnavailable(msg) => SyncError::RemoteUnavailable(msg),
            other => SyncError::Adapter(other),
        }
    }
}

impl From<SyncError> for BookifyError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::ReauthRequired(_) | SyncError::AuthExpired(_) => {
                BookifyError::AuthError(err.to_string())
            }
            SyncError::RemoteUnavailable(msg) => BookifyError::ServiceUnavailable(msg),
            SyncError::ConnectionNotFound(_) => BookifyError::NotFoundError(err.to_string()),
            SyncError::InvalidInput(msg) => BookifyError::ValidationError(msg),
            SyncError::Adapter(adapter) => adapter.into(),
            SyncError::Database(db) => db.into(),
        }
    }
}
