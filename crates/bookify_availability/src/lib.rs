// --- File: crates/bookify_availability/src/lib.rs ---

//! Answers "when can this provider be booked?".
//!
//! [`templates`] decides which weekly hours apply on a date, [`slots`] does the interval
//! arithmetic and [`AvailabilityResolver`] ties both to the calendar cache and bookings.

pub mod doc;
pub mod error;
pub mod handlers;
pub mod resolver;
#[cfg(test)]
mod resolver_test;
pub mod routes;
pub mod slots;
#[cfg(test)]
mod slots_proptest;
#[cfg(test)]
mod slots_test;
pub mod templates;

pub use error::AvailabilityError;
pub use resolver::AvailabilityResolver;
pub use slots::Slot;
pub use templates::TemplateEngine;
