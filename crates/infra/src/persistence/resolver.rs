use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::store::{InMemoryJobStore, JobStore};

/// Holds the job store that persistence calls are routed to.
///
/// Defaults to a fresh [`InMemoryJobStore`]. The store can be swapped at any
/// time; callers that resolve per operation see the swap on their next call.
pub struct StoreResolver {
    active: RwLock<Arc<dyn JobStore>>,
}

impl StoreResolver {
    pub fn new<S>(store: S) -> Self
    where
        S: JobStore + 'static,
    {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<dyn JobStore>) -> Self {
        Self {
            active: RwLock::new(store),
        }
    }

    /// Replace the active store.
    pub fn set<S>(&self, store: S)
    where
        S: JobStore + 'static,
    {
        self.set_shared(Arc::new(store));
    }

    pub fn set_shared(&self, store: Arc<dyn JobStore>) {
        // The slot only ever holds a complete `Arc`, so a poisoned lock still guards valid data.
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *active, store);
        info!(
            from = previous.backend(),
            to = active.backend(),
            "job store switched"
        );
    }

    /// The store currently selected.
    pub fn current(&self) -> Arc<dyn JobStore> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StoreResolver {
    fn default() -> Self {
        Self::new(InMemoryJobStore::new())
    }
}

impl fmt::Debug for StoreResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreResolver")
            .field("backend", &self.current().backend())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use jobforge_core::Job;

    #[test]
    fn defaults_to_in_memory_store() {
        let resolver = StoreResolver::default();
        assert_eq!(resolver.current().backend(), "memory");
        assert!(resolver.current().all(None).unwrap().is_empty());
    }

    #[test]
    fn current_returns_the_same_store_until_swapped() {
        let resolver = StoreResolver::default();
        resolver
            .current()
            .insert(Job::new("Emailer", json!(null)))
            .unwrap();

        assert_eq!(resolver.current().all(None).unwrap().len(), 1);
    }

    #[test]
    fn set_routes_later_calls_to_the_new_store() {
        let resolver = StoreResolver::default();
        let before = resolver.current();
        before.insert(Job::new("Emailer", json!(null))).unwrap();

        let replacement = InMemoryJobStore::arc();
        resolver.set_shared(replacement.clone());
        resolver
            .current()
            .insert(Job::new("Reporter", json!(null)))
            .unwrap();

        assert_eq!(before.all(None).unwrap().len(), 1);
        let moved = replacement.all(None).unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].worker, "Reporter");
    }

    #[test]
    fn debug_names_the_backend() {
        let resolver = StoreResolver::default();
        assert_eq!(format!("{resolver:?}"), r#"StoreResolver { backend: "memory" }"#);
    }
}
