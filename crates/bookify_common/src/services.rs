// --- File: crates/bookify_common/src/services.rs ---
//! Service abstractions for collaborators outside the booking core.
//!
//! Notifications are fire-and-forget: callers spawn them after the booking transaction has
//! committed and only log failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::info;
use uuid::Uuid;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// A wrapper error type that implements std::error::Error for Box<dyn std::error::Error + Send + Sync>
#[derive(Debug)]
pub struct BoxedError(pub Box<dyn StdError + Send + Sync>);

impl fmt::Display for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for BoxedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn StdError + Send + Sync>> for BoxedError {
    fn from(err: Box<dyn StdError + Send + Sync>) -> Self {
        BoxedError(err)
    }
}

/// What a notification channel needs to tell a customer about a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingNotice {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub service_type: Option<String>,
    /// Set for reschedules: the booking that was replaced.
    pub previous_booking_id: Option<Uuid>,
}

/// Represents the result of a notification operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    /// The ID of the notification.
    pub id: String,
    /// The status of the notification.
    pub status: String,
}

/// Outbound customer notifications (confirmation, reschedule, cancellation).
pub trait NotificationService: Send + Sync {
    /// Error type returned by notification service operations.
    type Error: std::error::Error + Send + Sync + 'static;

    fn booking_confirmed(&self, notice: BookingNotice)
        -> BoxFuture<'_, NotificationResult, Self::Error>;

    fn booking_rescheduled(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, Self::Error>;

    fn booking_cancelled(&self, notice: BookingNotice)
        -> BoxFuture<'_, NotificationResult, Self::Error>;
}

/// Notification channel that only records the event in the log.
///
/// Used when no mail or SMS channel is configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationService;

impl LoggingNotificationService {
    fn record(&self, kind: &str, notice: &BookingNotice) -> NotificationResult {
        info!(
            booking_id = %notice.booking_id,
            provider_id = %notice.provider_id,
            start_time = %notice.start_time,
            "Notification {} for {}",
            kind,
            notice.customer_email
        );
        NotificationResult {
            id: format!("log-{}-{}", kind, notice.booking_id),
            status: "logged".to_string(),
        }
    }
}

impl NotificationService for LoggingNotificationService {
    type Error = BoxedError;

    fn booking_confirmed(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, Self::Error> {
        Box::pin(async move { Ok(self.record("confirmed", &notice)) })
    }

    fn booking_rescheduled(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, Self::Error> {
        Box::pin(async move { Ok(self.record("rescheduled", &notice)) })
    }

    fn booking_cancelled(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, Self::Error> {
        Box::pin(async move { Ok(self.record("cancelled", &notice)) })
    }
}
