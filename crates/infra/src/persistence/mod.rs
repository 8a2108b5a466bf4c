//! Persistence entry point for jobs.
//!
//! [`Persistence`] is what the rest of a job system talks to. It performs no
//! validation or error translation of its own: each call asks its
//! [`StoreResolver`] for the active [`JobStore`] and forwards to it.

mod resolver;

pub use resolver::StoreResolver;

use std::sync::Arc;

use tracing::debug;

use jobforge_core::{Job, JobClass, JobId};

use crate::config::StoreSettings;
use crate::store::{InitError, JobStats, JobStore, StoreError};

/// Facade over the active job store.
///
/// Cheap to clone; clones share the resolver, so a swap through
/// [`Persistence::resolver`] is seen by every clone.
#[derive(Debug, Clone, Default)]
pub struct Persistence {
    resolver: Arc<StoreResolver>,
}

impl Persistence {
    pub fn new(resolver: Arc<StoreResolver>) -> Self {
        Self { resolver }
    }

    /// Facade over a single store.
    pub fn with_store<S>(store: S) -> Self
    where
        S: JobStore + 'static,
    {
        Self::new(Arc::new(StoreResolver::new(store)))
    }

    /// Build the backend named by `settings`. The store is not initialized yet.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self, InitError> {
        let store = settings.open()?;
        Ok(Self::new(Arc::new(StoreResolver::from_shared(store))))
    }

    pub fn resolver(&self) -> &Arc<StoreResolver> {
        &self.resolver
    }

    fn store(&self) -> Arc<dyn JobStore> {
        self.resolver.current()
    }
}

impl JobStore for Persistence {
    fn initialize(&self) -> Result<(), InitError> {
        let store = self.store();
        debug!(backend = store.backend(), "initializing job store");
        store.initialize()
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.store().find(id)
    }

    fn destroy(&self, id: JobId) -> Result<(), StoreError> {
        let store = self.store();
        debug!(backend = store.backend(), job_id = %id, "destroy");
        store.destroy(id)
    }

    fn insert(&self, job: Job) -> Result<Job, StoreError> {
        let store = self.store();
        debug!(backend = store.backend(), worker = %job.worker, "insert");
        store.insert(job)
    }

    fn update(&self, job: Job) -> Result<Job, StoreError> {
        let store = self.store();
        debug!(
            backend = store.backend(),
            job_id = ?job.id,
            worker = %job.worker,
            status = %job.status,
            "update"
        );
        store.update(job)
    }

    fn all(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.store().all(worker)
    }

    fn by_class(&self, class: JobClass, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.store().by_class(class, worker)
    }

    fn completed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.store().completed(worker)
    }

    fn incomplete(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.store().incomplete(worker)
    }

    fn failed(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.store().failed(worker)
    }

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, StoreError> {
        self.store().stats(worker)
    }

    fn backend(&self) -> &'static str {
        self.store().backend()
    }
}
