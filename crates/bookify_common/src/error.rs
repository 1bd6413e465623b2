// --- File: crates/bookify_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The HTTP-facing error type shared by all Bookify crates.
///
/// Each crate keeps its own domain error and implements `From<DomainError> for BookifyError`
/// so axum handlers can use `?` and get a consistent JSON error body.
#[derive(Error, Debug)]
pub enum BookifyError {
    /// Error occurred during an outbound HTTP request
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Error occurred while parsing data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Error occurred due to missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The calendar connection needs the provider to sign in again
    #[error("Reauthentication required: {0}")]
    AuthError(String),

    /// Malformed input, rejected before any I/O
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error occurred during database operation
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Error occurred during external service call
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// The requested change conflicts with current state (e.g. slot already taken)
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Error occurred due to a resource not being found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// A dependency is temporarily unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Error occurred due to an internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for BookifyError {
    fn status_code(&self) -> u16 {
        match self {
            BookifyError::HttpError(_) => 502,
            BookifyError::ParseError(_) => 400,
            BookifyError::ConfigError(_) => 500,
            BookifyError::AuthError(_) => 401,
            BookifyError::ValidationError(_) => 400,
            BookifyError::DatabaseError(_) => 500,
            BookifyError::ExternalServiceError { .. } => 502,
            BookifyError::ConflictError(_) => 409,
            BookifyError::NotFoundError(_) => 404,
            BookifyError::ServiceUnavailable(_) => 503,
            BookifyError::InternalError(_) => 500,
        }
    }
}

/// A trait for adding context to errors.
pub trait Context<T, E> {
    /// Adds context to an error.
    fn context<C>(self, context: C) -> Result<T, BookifyError>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Adds context to an error with a lazy context provider.
    fn with_context<C, F>(self, f: F) -> Result<T, BookifyError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: std::error::Error + Send + Sync + 'static> Context<T, E> for Result<T, E> {
    fn context<C>(self, context: C) -> Result<T, BookifyError>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| BookifyError::InternalError(format!("{}: {}", context, error)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, BookifyError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| BookifyError::InternalError(format!("{}: {}", f(), error)))
    }
}

// Common error conversions
impl From<reqwest::Error> for BookifyError {
    fn from(err: reqwest::Error) -> Self {
        BookifyError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for BookifyError {
    fn from(err: serde_json::Error) -> Self {
        BookifyError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for BookifyError {
    fn from(err: std::io::Error) -> Self {
        BookifyError::InternalError(err.to_string())
    }
}

// Utility functions for error handling
pub fn validation_error<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::ValidationError(message.to_string())
}

pub fn not_found<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::NotFoundError(message.to_string())
}

pub fn conflict<T: fmt::Display>(message: T) -> BookifyError {
    BookifyError::ConflictError(message.to_string())
}
