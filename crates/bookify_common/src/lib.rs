// --- File: crates/bookify_common/src/lib.rs ---

pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod models; // Domain models shared by every crate
pub mod services; // Service abstractions

// Re-export error types and utilities for easier access
pub use error::{conflict, not_found, validation_error, BookifyError, Context, HttpStatusCode};

// Re-export HTTP utilities for easier access
pub use http::{client::create_client, IntoHttpResponse};

// Re-export logging utilities for easier access
pub use logging::{init, init_with_level, log_error, log_result};
