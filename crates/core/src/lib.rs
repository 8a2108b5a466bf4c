//! `jobforge-core`: job entity, identifiers and status classification.
//!
//! This crate contains **pure domain** primitives (no storage concerns).

pub mod error;
pub mod id;
pub mod job;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Job, JobClass, JobStatus};
