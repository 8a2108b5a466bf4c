//! Strongly-typed job identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a persisted job.
///
/// Assigned by a store on first insert; never constructed by callers for new
/// jobs. Stores hand out ids in increasing order starting at 1.
///
/// Any `u64` parses, but stores only persist ids up to [`JobId::MAX`] (the
/// SQL `BIGINT` range). Larger ids are never found and cannot be written.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Largest id a store can persist.
    pub const MAX: JobId = JobId(i64::MAX as u64);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Whether a store can persist this id.
    pub const fn is_storable(&self) -> bool {
        self.0 <= Self::MAX.0
    }

    /// The id following this one, `None` at `u64::MAX`.
    pub const fn checked_next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<JobId> for u64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|e| DomainError::invalid_id(format!("JobId: {}", e)))?;
        Ok(Self(value))
    }
}
