//! Calendar platform adapters for Bookify
//!
//! Each platform (Google, Outlook and Teams through Microsoft Graph, Apple through CalDAV)
//! implements [`CalendarAdapter`]. Adapters normalise remote events to UTC, follow
//! pagination, and classify failures into [`AdapterError`]; they never touch the database.

pub mod adapter;
pub mod apple;
pub mod error;
pub mod google;
pub mod microsoft;
pub mod registry;

pub use adapter::{
    all_day_interval, CalendarAdapter, ConnectRequest, Credential, DateRange, NormalizedEvent,
    TokenGrant,
};
pub use error::AdapterError;
pub use registry::AdapterRegistry;
