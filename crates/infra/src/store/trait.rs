use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use jobforge_core::{Job, JobClass, JobId, JobStatus};

/// Storage failure for a job store operation.
///
/// This is the **non-recoverable** category: the contract does not ask stores
/// to tell retryable failures from permanent ones, so callers are expected to
/// propagate it (`?`) up to whatever boundary owns resilience. Absence of a job
/// is never reported through this type (`find` returns `Ok(None)`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be reached (closed pool, I/O failure).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the write (constraint, check, out-of-range id).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored record could not be decoded into a `Job`.
    #[error("corrupt job record: {0}")]
    Corrupt(String),

    /// `insert` was handed a job that already carries an id.
    #[error("job already has id {0}; use update to overwrite it")]
    IdAlreadyAssigned(JobId),

    /// An in-process lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Any other backend error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Failure to prepare a store for use.
///
/// Distinct from `StoreError` because startup is the one place where callers
/// make a go/no-go decision instead of aborting.
#[derive(Debug, Error)]
pub enum InitError {
    /// The store's private async runtime could not be built.
    #[error("failed to start store runtime: {0}")]
    Runtime(String),

    /// The backend could not be reached.
    #[error("failed to connect to {backend}: {message}")]
    Connect {
        backend: &'static str,
        message: String,
    },

    /// Storage structures could not be created or verified.
    #[error("failed to prepare {backend} schema: {message}")]
    Schema {
        backend: &'static str,
        message: String,
    },
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub started: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Started => self.started += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn incomplete(&self) -> usize {
        self.queued + self.started
    }

    pub fn total(&self) -> usize {
        self.incomplete() + self.completed + self.failed
    }
}

impl<'a> FromIterator<&'a Job> for JobStats {
    fn from_iter<I: IntoIterator<Item = &'a Job>>(iter: I) -> Self {
        let mut stats = JobStats::default();
        for job in iter {
            stats.record(job.status);
        }
        stats
    }
}

/// Storage-agnostic persistence contract for jobs.
///
/// Every backend must behave identically with respect to:
///
/// - **Identity**: `insert` assigns an id never handed out before by this store
///   (ids of destroyed jobs are not reused). Concurrent inserts never share an id.
/// - **Upsert**: `update` overwrites the record with the job's id when one exists.
///   A job without an id is inserted with a fresh id; a job whose id matches no
///   record is inserted under that id, and the id allocator is moved past it.
/// - **Classification**: `incomplete` = `queued | started`, `completed`, `failed`.
///   The three listings partition `all`. The provided `by_class` derives them from
///   `all` through `JobStatus::class`, so overriding it is an optimisation only.
/// - **Ordering**: listings are sorted by ascending id.
/// - **Deletion**: `destroy` of an unknown id is a no-op.
/// - **Concurrency**: concurrent `update`/`destroy` on one id serialize to one of
///   the submitted states (last writer wins).
///
/// All operations are synchronous; the caller blocks until the backend answers.
pub trait JobStore: Send + Sync {
    /// Ensure storage structures exist. Idempotent; never drops data.
    fn initialize(&self) -> Result<(), InitError>;

    /// Load a job by id. `Ok(None)` when no such job exists.
    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Remove a job permanently. Unknown ids are ignored.
    fn destroy(&self, id: JobId) -> Result<(), StoreError>;

    /// Persist a new job and return it with its freshly assigned id.
    fn insert(&self, job: Job) -> Result<Job, StoreError>;

    /// Upsert a job and return the stored result.
    fn update(&self, job: Job) -> Result<Job, StoreError>;

    /// Every persisted job, optionally restricted to one worker.
    fn all(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError>;

    /// Jobs of one class, optionally restricted to one worker.
    fn by_class(&self, class: JobClass, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.all(worker)?;
        jobs.retain(|job| job.class() == class);
        Ok(jobs)
    }

    /// Jobs with status `completed`.
    fn completed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.by_class(JobClass::Completed, worker)
    }

    /// Jobs with status `queued` or `started` (never `failed`).
    fn incomplete(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.by_class(JobClass::Incomplete, worker)
    }

    /// Jobs with status `failed`.
    fn failed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.by_class(JobClass::Failed, worker)
    }

    /// Per-status counts, optionally restricted to one worker.
    fn stats(&self, worker: Option<&str>) -> Result<JobStats, StoreError> {
        Ok(self.all(worker)?.iter().collect())
    }

    /// Short backend name for log fields.
    fn backend(&self) -> &'static str;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn initialize(&self) -> Result<(), InitError> {
        (**self).initialize()
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).find(id)
    }

    fn destroy(&self, id: JobId) -> Result<(), StoreError> {
        (**self).destroy(id)
    }

    fn insert(&self, job: Job) -> Result<Job, StoreError> {
        (**self).insert(job)
    }

    fn update(&self, job: Job) -> Result<Job, StoreError> {
        (**self).update(job)
    }

    fn all(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        (**self).all(worker)
    }

    fn by_class(&self, class: JobClass, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        (**self).by_class(class, worker)
    }

    fn completed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        (**self).completed(worker)
    }

    fn incomplete(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        (**self).incomplete(worker)
    }

    fn failed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        (**self).failed(worker)
    }

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, StoreError> {
        (**self).stats(worker)
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_count_each_status_once() {
        let jobs = vec![
            Job::new("a", json!(null)),
            Job::new("a", json!(null)).with_status(JobStatus::Started),
            Job::new("b", json!(null)).with_status(JobStatus::Completed),
            Job::new("b", json!(null)).with_status(JobStatus::Failed),
            Job::new("b", json!(null)).with_status(JobStatus::Failed),
        ];

        let stats: JobStats = jobs.iter().collect();
        assert_eq!(
            stats,
            JobStats {
                queued: 1,
                started: 1,
                completed: 1,
                failed: 2,
            }
        );
        assert_eq!(stats.incomplete(), 2);
        assert_eq!(stats.total(), jobs.len());
    }

    #[test]
    fn init_error_names_the_backend() {
        let err = InitError::Schema {
            backend: "sqlite",
            message: "disk I/O error".to_string(),
        };
        assert_eq!(err.to_string(), "failed to prepare sqlite schema: disk I/O error");
    }
}
