//! Helpers shared by the SQL backends: runtime setup, row mapping and error
//! mapping.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | Database (unique / foreign key / not-null / check violation) | `Constraint` |
//! | Database (other) | `Backend` |
//! | PoolClosed, PoolTimedOut, Io, Tls | `Unavailable` |
//! | ColumnDecode, Decode, ColumnNotFound | `Corrupt` |
//! | Other | `Backend` |

use anyhow::Context;
use serde_json::Value as JsonValue;
use sqlx::error::ErrorKind;
use sqlx::types::Json;
use tokio::runtime::Runtime;

use jobforge_core::{Job, JobClass, JobId, JobStatus};

use super::r#trait::{InitError, JobStats, StoreError};

/// Runtime owned by a SQL store; every trait call blocks on it.
pub(crate) fn store_runtime() -> Result<Runtime, InitError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("jobforge-store")
        .enable_all()
        .build()
        .map_err(|e| InitError::Runtime(e.to_string()))
}

/// Raw `jobs` row as stored by the SQL backends.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: i64,
    pub worker: String,
    pub arguments: Json<JsonValue>,
    pub status: String,
}

impl JobRow {
    fn into_job(self) -> anyhow::Result<Job> {
        let id = u64::try_from(self.id)
            .with_context(|| format!("negative job id {}", self.id))?;
        let status = self
            .status
            .parse::<JobStatus>()
            .with_context(|| format!("job {id} has unknown status"))?;

        Ok(Job {
            id: Some(JobId::new(id)),
            worker: self.worker,
            arguments: self.arguments.0,
            status,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        row.into_job()
            .map_err(|err| StoreError::Corrupt(format!("{err:#}")))
    }
}

/// Decode a batch of rows, failing on the first corrupt one.
pub(crate) fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, StoreError> {
    rows.into_iter().map(Job::try_from).collect()
}

/// Fold `(status, count)` rows into `JobStats`.
pub(crate) fn into_stats(rows: Vec<(String, i64)>) -> Result<JobStats, StoreError> {
    let mut stats = JobStats::default();
    for (status, count) in rows {
        let status = status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let count = usize::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("negative count for {status}")))?;
        match status {
            JobStatus::Queued => stats.queued += count,
            JobStatus::Started => stats.started += count,
            JobStatus::Completed => stats.completed += count,
            JobStatus::Failed => stats.failed += count,
        }
    }
    Ok(stats)
}

/// SQL integer form of an id about to be written.
pub(crate) fn sql_id(id: JobId) -> Result<i64, StoreError> {
    lookup_id(id)
        .ok_or_else(|| StoreError::Constraint(format!("job id {id} exceeds the storable range")))
}

/// SQL integer form of an id used as a lookup key. `None` means no row can match.
pub(crate) fn lookup_id(id: JobId) -> Option<i64> {
    i64::try_from(id.get()).ok()
}

/// Status texts of a class, padded to two entries for `status IN (?, ?)`.
pub(crate) fn class_statuses(class: JobClass) -> (&'static str, &'static str) {
    match class.statuses() {
        [only] => (only.as_str(), only.as_str()),
        [first, second, ..] => (first.as_str(), second.as_str()),
        [] => ("", ""),
    }
}

/// `CHECK` clause restricting the status column to the job status vocabulary.
pub(crate) fn status_check() -> String {
    let allowed: Vec<String> = JobStatus::ALL
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect();
    format!("CHECK (status IN ({}))", allowed.join(", "))
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {}: {}", operation, err))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("I/O error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("TLS error in {}: {}", operation, e)),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("failed to decode row in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
