//! Job persistence: storage backends, backend selection and the facade the
//! rest of a job system calls.

pub mod config;
pub mod persistence;
pub mod store;

mod integration_tests;

pub use config::{ConfigError, StoreBackend, StoreSettings};
pub use persistence::{Persistence, StoreResolver};
pub use store::{InitError, JobStats, JobStore, StoreError};
