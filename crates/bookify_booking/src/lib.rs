// --- File: crates/bookify_booking/src/lib.rs ---

//! Booking admission. [`BookingGuard`] is the last check before a booking is persisted.

pub mod doc;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod routes;
#[cfg(test)]
mod test_support;

pub use error::BookingError;
pub use guard::{BookingGuard, CustomerDetails, NewBooking, NewSlotBooking, Notifier};
