//! Job storage backends.
//!
//! - [`JobStore`]: the persistence contract every backend implements
//! - [`InMemoryJobStore`]: process-local default backend
//! - [`SqliteJobStore`], [`PostgresJobStore`]: SQL backends via `sqlx`
//!
//! With the `testing` feature, [`conformance`] exposes the checks every
//! backend is expected to pass.

pub mod r#trait;
pub mod in_memory;
pub mod postgres;
pub mod sqlite;
mod row;

#[cfg(any(test, feature = "testing"))]
pub mod conformance;

pub use in_memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use r#trait::{InitError, JobStats, JobStore, StoreError};
pub use sqlite::SqliteJobStore;
