use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use jobforge_core::{Job, JobClass, JobId};

use super::r#trait::{InitError, JobStore, StoreError};

#[derive(Debug)]
struct Table {
    jobs: BTreeMap<JobId, Job>,
    /// Next id to hand out. Only moves forward, so destroyed ids stay retired.
    next_id: JobId,
}

impl Table {
    fn allocate(&mut self) -> Result<JobId, StoreError> {
        let id = self.next_id;
        if !id.is_storable() {
            return Err(StoreError::Constraint("job id space exhausted".to_string()));
        }
        self.next_id = id
            .checked_next()
            .ok_or_else(|| StoreError::Constraint("job id space exhausted".to_string()))?;
        Ok(id)
    }

    /// Keep the allocator ahead of an id chosen by the caller.
    fn reserve(&mut self, id: JobId) -> Result<(), StoreError> {
        if !id.is_storable() {
            return Err(StoreError::Constraint(format!(
                "job id {id} exceeds the storable range"
            )));
        }
        if id >= self.next_id {
            self.next_id = id
                .checked_next()
                .ok_or_else(|| StoreError::Constraint(format!("job id {id} is out of range")))?;
        }
        Ok(())
    }
}

impl Default for Table {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: JobId::new(1),
        }
    }
}

/// In-memory job store; the built-in default backend.
///
/// One `RwLock` guards both the table and the id counter, so id assignment and
/// overwrites are atomic with respect to each other. Data lives as long as the
/// store value.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    table: RwLock<Table>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Table>, StoreError> {
        self.table.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Table>, StoreError> {
        self.table.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn select<F>(&self, worker: Option<&str>, keep: F) -> Result<Vec<Job>, StoreError>
    where
        F: Fn(&Job) -> bool,
    {
        let table = self.read()?;
        Ok(table
            .jobs
            .values()
            .filter(|job| worker.is_none_or(|w| job.worker == w) && keep(job))
            .cloned()
            .collect())
    }
}

impl JobStore for InMemoryJobStore {
    fn initialize(&self) -> Result<(), InitError> {
        debug!(backend = self.backend(), "store initialized");
        Ok(())
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    fn destroy(&self, id: JobId) -> Result<(), StoreError> {
        let removed = self.write()?.jobs.remove(&id);
        debug!(job_id = %id, existed = removed.is_some(), "job destroyed");
        Ok(())
    }

    fn insert(&self, mut job: Job) -> Result<Job, StoreError> {
        if let Some(id) = job.id {
            return Err(StoreError::IdAlreadyAssigned(id));
        }

        let mut table = self.write()?;
        let id = table.allocate()?;
        job.id = Some(id);
        table.jobs.insert(id, job.clone());

        debug!(job_id = %id, worker = %job.worker, status = %job.status, "job inserted");
        Ok(job)
    }

    fn update(&self, mut job: Job) -> Result<Job, StoreError> {
        let mut table = self.write()?;
        let id = match job.id {
            Some(id) => {
                table.reserve(id)?;
                id
            }
            None => {
                let id = table.allocate()?;
                job.id = Some(id);
                id
            }
        };
        let previous = table.jobs.insert(id, job.clone());

        debug!(
            job_id = %id,
            worker = %job.worker,
            status = %job.status,
            created = previous.is_none(),
            "job upserted"
        );
        Ok(job)
    }

    fn all(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.select(worker, |_| true)
    }

    fn by_class(&self, class: JobClass, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.select(worker, |job| job.class() == class)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
