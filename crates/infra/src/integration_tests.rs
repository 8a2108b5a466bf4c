//! End-to-end tests through the persistence facade.
//!
//! Tests: Persistence → StoreResolver → JobStore → storage
//!
//! Verifies:
//! - The job lifecycle round-trips through configured backends
//! - Backend swaps take effect for later calls
//! - Racing updates and destroys on one id serialize to a submitted state
//! - Random operation sequences keep ids fresh and classes partitioned

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use jobforge_core::{Job, JobClass, JobId, JobStatus};

    use crate::config::{StoreBackend, StoreSettings};
    use crate::persistence::{Persistence, StoreResolver};
    use crate::store::{InMemoryJobStore, JobStore, SqliteJobStore};

    fn sqlite_settings(dir: &tempfile::TempDir) -> StoreSettings {
        StoreSettings {
            backend: StoreBackend::Sqlite,
            sqlite_url: format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display()),
            ..StoreSettings::default()
        }
    }

    fn incomplete_ids(persistence: &Persistence, worker: Option<&str>) -> Vec<JobId> {
        persistence
            .incomplete(worker)
            .unwrap()
            .into_iter()
            .filter_map(|job| job.id)
            .collect()
    }

    #[test]
    fn emailer_lifecycle_through_configured_sqlite() {
        jobforge_observability::init_for_tests();
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::from_settings(&sqlite_settings(&dir)).unwrap();
        persistence.initialize().unwrap();

        let job = persistence
            .insert(Job::new("Emailer", json!(["a@example.com"])))
            .unwrap();
        let id = job.id.unwrap();
        assert_eq!(id, JobId::new(1));
        assert!(persistence.completed(None).unwrap().is_empty());
        assert_eq!(incomplete_ids(&persistence, None), vec![id]);

        persistence
            .update(job.clone().with_status(JobStatus::Started))
            .unwrap();
        assert_eq!(incomplete_ids(&persistence, Some("Emailer")), vec![id]);

        persistence
            .update(job.clone().with_status(JobStatus::Completed))
            .unwrap();
        assert_eq!(persistence.completed(None).unwrap().len(), 1);
        assert!(persistence.incomplete(None).unwrap().is_empty());
        assert!(persistence.failed(None).unwrap().is_empty());

        persistence.destroy(id).unwrap();
        persistence.destroy(id).unwrap();
        assert_eq!(persistence.find(id).unwrap(), None);
        for class in JobClass::ALL {
            assert!(persistence.by_class(class, None).unwrap().is_empty());
        }
        assert!(persistence.all(None).unwrap().is_empty());
    }

    #[test]
    fn resolver_swap_redirects_subsequent_calls() {
        let resolver = Arc::new(StoreResolver::default());
        let persistence = Persistence::new(resolver.clone());
        let first = persistence.insert(Job::new("Emailer", json!([]))).unwrap();

        let sqlite = SqliteJobStore::in_memory().unwrap();
        sqlite.initialize().unwrap();
        resolver.set(sqlite);

        assert_eq!(persistence.backend(), "sqlite");
        assert_eq!(persistence.find(first.id.unwrap()).unwrap(), None);
        let second = persistence.insert(Job::new("Reporter", json!([]))).unwrap();
        assert_eq!(persistence.all(None).unwrap(), vec![second]);
    }

    #[test]
    fn facade_shared_across_threads_hands_out_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::from_settings(&sqlite_settings(&dir)).unwrap();
        persistence.initialize().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let persistence = persistence.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            persistence
                                .insert(Job::new("Emailer", json!({ "t": t, "i": i })))
                                .unwrap()
                                .id
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(persistence.stats(None).unwrap().queued, 100);
    }

    #[test]
    fn racing_updates_and_destroys_on_one_id_settle_on_a_submitted_state() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::from_settings(&sqlite_settings(&dir)).unwrap();
        persistence.initialize().unwrap();
        let job = persistence
            .insert(Job::new("Emailer", json!(["a@example.com"])))
            .unwrap();
        let id = job.id.unwrap();

        let mut handles: Vec<_> = JobStatus::ALL
            .into_iter()
            .map(|status| {
                let persistence = persistence.clone();
                let job = job.clone().with_status(status);
                thread::spawn(move || {
                    for _ in 0..20 {
                        persistence.update(job.clone()).unwrap();
                    }
                })
            })
            .collect();
        handles.extend((0..2).map(|_| {
            let persistence = persistence.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    persistence.destroy(id).unwrap();
                }
            })
        }));
        for handle in handles {
            handle.join().unwrap();
        }

        let all = persistence.all(None).unwrap();
        match persistence.find(id).unwrap() {
            Some(stored) => {
                assert_eq!(stored.worker, job.worker);
                assert_eq!(stored.arguments, job.arguments);
                assert!(JobStatus::ALL.contains(&stored.status));
                assert_eq!(all, vec![stored]);
            }
            None => assert!(all.is_empty()),
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const WORKERS: [&str; 3] = ["Emailer", "Reporter", "Billing"];

        #[derive(Debug, Clone)]
        enum Op {
            Insert { worker: usize, status: JobStatus },
            Update { id: u64, worker: usize, status: JobStatus },
            Destroy { id: u64 },
        }

        fn status() -> impl Strategy<Value = JobStatus> {
            prop::sample::select(JobStatus::ALL.to_vec())
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0..WORKERS.len(), status())
                    .prop_map(|(worker, status)| Op::Insert { worker, status }),
                (1..40u64, 0..WORKERS.len(), status())
                    .prop_map(|(id, worker, status)| Op::Update { id, worker, status }),
                (1..40u64).prop_map(|id| Op::Destroy { id }),
            ]
        }

        /// Apply `ops` to `store` and to a map model, checking the store against it.
        fn check_against_model(store: &dyn JobStore, ops: &[Op]) -> Result<(), TestCaseError> {
            let mut model: BTreeMap<JobId, Job> = BTreeMap::new();
            let mut highest = 0u64;

            for op in ops {
                match op {
                    Op::Insert { worker, status } => {
                        let job = Job::new(WORKERS[*worker], json!({ "op": "insert" }))
                            .with_status(*status);
                        let stored = store.insert(job).unwrap();
                        let id = stored.id.unwrap();
                        prop_assert!(id.get() > highest, "id {} reused (highest {})", id, highest);
                        highest = id.get();
                        model.insert(id, stored);
                    }
                    Op::Update { id, worker, status } => {
                        let job = Job::new(WORKERS[*worker], json!({ "op": "update" }))
                            .with_id(JobId::new(*id))
                            .with_status(*status);
                        let stored = store.update(job).unwrap();
                        highest = highest.max(*id);
                        model.insert(JobId::new(*id), stored);
                    }
                    Op::Destroy { id } => {
                        store.destroy(JobId::new(*id)).unwrap();
                        model.remove(&JobId::new(*id));
                    }
                }
            }

            let expected: Vec<Job> = model.values().cloned().collect();
            prop_assert_eq!(store.all(None).unwrap(), expected.clone());

            let mut classified: Vec<Job> = JobClass::ALL
                .into_iter()
                .flat_map(|class| store.by_class(class, None).unwrap())
                .collect();
            classified.sort_by_key(|job| job.id);
            prop_assert_eq!(classified, expected.clone());

            for worker in WORKERS {
                let subset: Vec<Job> = expected
                    .iter()
                    .filter(|job| job.worker == worker)
                    .cloned()
                    .collect();
                prop_assert_eq!(store.all(Some(worker)).unwrap(), subset);
            }
            Ok(())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            #[test]
            fn in_memory_store_matches_model(ops in prop::collection::vec(op(), 0..60)) {
                check_against_model(&InMemoryJobStore::new(), &ops)?;
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 24,
                ..ProptestConfig::default()
            })]

            #[test]
            fn sqlite_store_matches_model(ops in prop::collection::vec(op(), 0..40)) {
                let store = SqliteJobStore::in_memory().unwrap();
                store.initialize().unwrap();
                check_against_model(&store, &ops)?;
            }
        }
    }
}
