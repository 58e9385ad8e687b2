//! SQLite backend for the drop access core.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Uniqueness rules the core relies on
//! (one user per address, one entry per purchase, one bundle per period)
//! are enforced by the schema rather than by read-then-write checks.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
