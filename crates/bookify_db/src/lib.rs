//! Persistence for Bookify
//!
//! A SQLite store behind sqlx. [`DbClient`] owns the pool and the schema; the
//! [`repositories`] hold every query, one module per aggregate.
//!
//! # Example
//!
//! ```rust,no_run
//! use bookify_db::{DbClient, Repositories};
//! use bookify_db::repositories::ProviderRepository;
//! use bookify_common::models::Provider;
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = DbClient::from_url("sqlite:data/bookify.db").await?;
//!     db.init_schema().await?;
//!     let repos = Repositories::new(&db);
//!     repos.providers.create_provider(Provider::new("Dr. Muster", "Europe/Zurich")).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod repositories;
mod schema;

pub use client::{DbClient, DbTransaction};
pub use error::DbError;
pub use repositories::Repositories;
