use bookify_common::BookifyError;
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single call against a calendar platform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The access token or grant was rejected; a refresh (or a reconnect) is needed.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Timeouts, connection failures, rate limits and 5xx answers.
    #[error("Remote calendar unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Invalid response from remote calendar: {0}")]
    InvalidResponse(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl AdapterError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, AdapterError::AuthExpired(_))
    }

    /// Classifies a non-success HTTP answer from a platform API or token endpoint.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = format!("{}: {}", status, truncate(body));
        if status == StatusCode::UNAUTHORIZED {
            return AdapterError::AuthExpired(detail);
        }
        // token endpoints answer a revoked or expired grant with 400 invalid_grant
        if status == StatusCode::BAD_REQUEST && body.contains("invalid_grant") {
            return AdapterError::AuthExpired(detail);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return AdapterError::RemoteUnavailable(detail);
        }
        if status == StatusCode::FORBIDDEN
            && body.to_ascii_lowercase().contains("ratelimitexceeded")
        {
            return AdapterError::RemoteUnavailable(detail);
        }
        AdapterError::InvalidResponse(detail)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            AdapterError::from_status(status, "")
        } else {
            AdapterError::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<AdapterError> for BookifyError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::AuthExpired(msg) => BookifyError::AuthError(msg),
            AdapterError::RemoteUnavailable(msg) => BookifyError::ServiceUnavailable(msg),
            AdapterError::InvalidResponse(message) => BookifyError::ExternalServiceError {
                service_name: "calendar".to_string(),
                message,
            },
            AdapterError::Unsupported(msg) => BookifyError::ValidationError(msg),
        }
    }
}
