//! Job entity and status classification.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DomainError;
use crate::id::JobId;

/// Job status.
///
/// Lifecycle: `Queued -> Started -> Completed` or `Queued -> Started -> Failed`.
/// Transitions are decided by the worker layer; stores persist whatever status
/// they are given.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up
    Queued,
    /// Picked up by a worker, not finished yet
    Started,
    /// Finished successfully
    Completed,
    /// Finished with a failure
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Started,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Textual form used by durable stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn class(&self) -> JobClass {
        match self {
            JobStatus::Queued | JobStatus::Started => JobClass::Incomplete,
            JobStatus::Completed => JobClass::Completed,
            JobStatus::Failed => JobClass::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "started" => Ok(JobStatus::Started),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::invalid_status(other)),
        }
    }
}

/// Classification of a job by its status.
///
/// Every job belongs to exactly one class. Listing queries (`incomplete`,
/// `completed`, `failed`) are defined in terms of this partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobClass {
    /// `queued` or `started`
    Incomplete,
    /// `completed`
    Completed,
    /// `failed`
    Failed,
}

impl JobClass {
    pub const ALL: [JobClass; 3] = [JobClass::Incomplete, JobClass::Completed, JobClass::Failed];

    /// Statuses belonging to this class.
    pub fn statuses(&self) -> &'static [JobStatus] {
        match self {
            JobClass::Incomplete => &[JobStatus::Queued, JobStatus::Started],
            JobClass::Completed => &[JobStatus::Completed],
            JobClass::Failed => &[JobStatus::Failed],
        }
    }

    pub fn contains(&self, status: JobStatus) -> bool {
        status.class() == *self
    }
}

/// A unit of queued work.
///
/// Plain value: stores take jobs by value and hand back fresh copies, nothing
/// holds on to a shared instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the store on first insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    /// Worker type responsible for executing the job
    pub worker: String,
    /// Opaque payload handed to the worker
    pub arguments: JsonValue,
    /// Current status
    pub status: JobStatus,
}

impl Job {
    /// Create a new, not yet persisted, queued job.
    pub fn new(worker: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: None,
            worker: worker.into(),
            arguments,
            status: JobStatus::Queued,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// True until a store has assigned an id.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn class(&self) -> JobClass {
        self.status.class()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_job_is_queued_without_id() {
        let job = Job::new("Emailer", json!(["a@example.com"]));

        assert!(job.is_new());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.class(), JobClass::Incomplete);
    }

    #[test]
    fn classification_partitions_statuses() {
        for status in JobStatus::ALL {
            let owners: Vec<_> = JobClass::ALL
                .iter()
                .filter(|class| class.contains(status))
                .collect();
            assert_eq!(owners.len(), 1, "{status} must belong to exactly one class");
            assert!(owners[0].statuses().contains(&status));
        }
    }

    #[test]
    fn failed_is_never_incomplete() {
        assert!(!JobClass::Incomplete.contains(JobStatus::Failed));
        assert!(JobClass::Incomplete.contains(JobStatus::Started));
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
    }

    #[test]
    fn status_text_round_trips() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                json!(status.as_str())
            );
        }
        assert!(matches!(
            "running".parse::<JobStatus>(),
            Err(DomainError::InvalidStatus(_))
        ));
    }

    #[test]
    fn equality_is_by_value() {
        let a = Job::new("Emailer", json!({"to": "a@example.com"})).with_id(JobId::new(1));
        let b = Job::new("Emailer", json!({"to": "a@example.com"})).with_id(JobId::new(1));
        assert_eq!(a, b);
        assert_ne!(a.clone().with_status(JobStatus::Started), b);
    }

    #[test]
    fn serializes_without_id_when_new() {
        let job = Job::new("Reporter", json!(null));
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["status"], json!("queued"));

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
