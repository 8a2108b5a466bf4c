//! Contract checks every `JobStore` backend must pass.
//!
//! Each check expects an initialized, empty store. In-tree backends run them
//! through [`job_store_contract_tests!`](crate::job_store_contract_tests), which
//! builds a fresh store per test. Backends sharing one database across checks
//! (see the Postgres live test) iterate [`CHECKS`] and reset storage in between.

use std::collections::HashSet;

use serde_json::json;

use jobforge_core::{Job, JobClass, JobId, JobStatus};

use super::r#trait::{JobStats, JobStore, StoreError};

/// Every check, by name.
pub const CHECKS: &[(&str, fn(&dyn JobStore))] = &[
    ("insert_assigns_fresh_ids", insert_assigns_fresh_ids),
    ("insert_rejects_job_with_id", insert_rejects_job_with_id),
    ("find_unknown_id_is_none", find_unknown_id_is_none),
    ("unstorable_ids_are_absent_and_unwritable", unstorable_ids_are_absent_and_unwritable),
    ("update_overwrites_existing_job", update_overwrites_existing_job),
    ("update_without_id_inserts", update_without_id_inserts),
    ("update_unknown_id_inserts_under_that_id", update_unknown_id_inserts_under_that_id),
    ("destroy_removes_job", destroy_removes_job),
    ("destroy_unknown_id_is_noop", destroy_unknown_id_is_noop),
    ("destroyed_ids_are_not_reused", destroyed_ids_are_not_reused),
    ("classes_partition_all_jobs", classes_partition_all_jobs),
    ("worker_filter_is_exact_subset", worker_filter_is_exact_subset),
    ("listings_are_ordered_by_id", listings_are_ordered_by_id),
    ("initialize_is_idempotent", initialize_is_idempotent),
    ("stats_match_listings", stats_match_listings),
    ("arguments_are_stored_verbatim", arguments_are_stored_verbatim),
    ("emailer_lifecycle", emailer_lifecycle),
];

/// Run every check in order, calling `reset` before each one.
pub fn run_all<R>(store: &dyn JobStore, mut reset: R)
where
    R: FnMut(),
{
    for (name, check) in CHECKS {
        reset();
        tracing::debug!(check = name, backend = store.backend(), "running contract check");
        check(store);
    }
}

fn ids(jobs: &[Job]) -> Vec<JobId> {
    jobs.iter().filter_map(|job| job.id).collect()
}

fn seed_mixed(store: &dyn JobStore) -> Vec<Job> {
    let fixtures = [
        ("Emailer", JobStatus::Queued),
        ("Emailer", JobStatus::Started),
        ("Emailer", JobStatus::Completed),
        ("Emailer", JobStatus::Failed),
        ("Reporter", JobStatus::Queued),
        ("Reporter", JobStatus::Failed),
        ("Reporter", JobStatus::Failed),
        ("Billing", JobStatus::Completed),
    ];
    fixtures
        .iter()
        .enumerate()
        .map(|(n, (worker, status))| {
            store
                .insert(Job::new(*worker, json!({ "n": n })).with_status(*status))
                .expect("insert fixture")
        })
        .collect()
}

pub fn insert_assigns_fresh_ids(store: &dyn JobStore) {
    let mut seen = HashSet::new();
    for n in 0..5 {
        let job = Job::new("Emailer", json!({ "n": n }));
        let stored = store.insert(job.clone()).expect("insert");

        let id = stored.id.expect("insert must assign an id");
        assert!(seen.insert(id), "id {id} assigned twice");
        assert_eq!(stored.worker, job.worker);
        assert_eq!(stored.arguments, job.arguments);
        assert_eq!(stored.status, job.status);

        assert_eq!(store.find(id).expect("find"), Some(stored));
    }
}

pub fn insert_rejects_job_with_id(store: &dyn JobStore) {
    let stored = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let err = store.insert(stored.clone()).expect_err("insert with id must fail");

    assert!(matches!(err, StoreError::IdAlreadyAssigned(id) if Some(id) == stored.id));
    assert_eq!(store.all(None).expect("all").len(), 1);
}

pub fn find_unknown_id_is_none(store: &dyn JobStore) {
    assert_eq!(store.find(JobId::new(4_242)).expect("find"), None);
}

pub fn unstorable_ids_are_absent_and_unwritable(store: &dyn JobStore) {
    let kept = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let beyond = JobId::new(u64::MAX);
    assert!(!beyond.is_storable());

    assert_eq!(store.find(beyond).expect("find beyond storable range"), None);
    store.destroy(beyond).expect("destroy beyond storable range");

    let err = store
        .update(Job::new("Emailer", json!(2)).with_id(beyond))
        .expect_err("update beyond storable range must fail");
    assert!(matches!(err, StoreError::Constraint(_)), "{err:?}");

    assert_eq!(store.all(None).expect("all"), vec![kept]);
}

pub fn update_overwrites_existing_job(store: &dyn JobStore) {
    let stored = store.insert(Job::new("Emailer", json!(["a@example.com"]))).expect("insert");

    let mut changed = stored.clone().with_status(JobStatus::Started);
    changed.arguments = json!(["b@example.com"]);
    let updated = store.update(changed.clone()).expect("update");

    assert_eq!(updated, changed);
    assert_eq!(store.find(stored.id.expect("id")).expect("find"), Some(changed));
    assert_eq!(store.all(None).expect("all").len(), 1);
}

pub fn update_without_id_inserts(store: &dyn JobStore) {
    let existing = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let upserted = store.update(Job::new("Emailer", json!(2))).expect("update");

    let id = upserted.id.expect("update must assign an id to a new job");
    assert_ne!(Some(id), existing.id);
    assert_eq!(store.find(id).expect("find"), Some(upserted));
    assert_eq!(store.all(None).expect("all").len(), 2);
}

pub fn update_unknown_id_inserts_under_that_id(store: &dyn JobStore) {
    let existing = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let chosen = JobId::new(existing.id.expect("id").get() + 100);

    let job = Job::new("Reporter", json!({ "k": "v" })).with_id(chosen);
    let upserted = store.update(job.clone()).expect("update");

    assert_eq!(upserted, job);
    assert_eq!(store.find(chosen).expect("find"), Some(job));

    let next = store.insert(Job::new("Emailer", json!(2))).expect("insert");
    let next_id = next.id.expect("id");
    assert_ne!(next_id, chosen);
    assert_ne!(Some(next_id), existing.id);
    assert_eq!(store.all(None).expect("all").len(), 3);
}

pub fn destroy_removes_job(store: &dyn JobStore) {
    let keep = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let gone = store.insert(Job::new("Emailer", json!(2))).expect("insert");
    let gone_id = gone.id.expect("id");

    store.destroy(gone_id).expect("destroy");

    assert_eq!(store.find(gone_id).expect("find"), None);
    assert_eq!(store.all(None).expect("all"), vec![keep]);
}

pub fn destroy_unknown_id_is_noop(store: &dyn JobStore) {
    let stored = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let id = stored.id.expect("id");

    store.destroy(id).expect("first destroy");
    store.destroy(id).expect("second destroy of same id");
    store.destroy(JobId::new(9_999)).expect("destroy of never-used id");

    assert!(store.all(None).expect("all").is_empty());
}

pub fn destroyed_ids_are_not_reused(store: &dyn JobStore) {
    let first = store.insert(Job::new("Emailer", json!(1))).expect("insert");
    let first_id = first.id.expect("id");
    store.destroy(first_id).expect("destroy");

    let second = store.insert(Job::new("Emailer", json!(2))).expect("insert");
    assert!(second.id.expect("id") > first_id);
}

pub fn classes_partition_all_jobs(store: &dyn JobStore) {
    seed_mixed(store);
    let all = store.all(None).expect("all");
    let incomplete = store.incomplete(None).expect("incomplete");
    let completed = store.completed(None).expect("completed");
    let failed = store.failed(None).expect("failed");

    assert!(
        incomplete
            .iter()
            .all(|job| matches!(job.status, JobStatus::Queued | JobStatus::Started))
    );
    assert!(completed.iter().all(|job| job.status == JobStatus::Completed));
    assert!(failed.iter().all(|job| job.status == JobStatus::Failed));

    let mut classified: Vec<JobId> = ids(&incomplete);
    classified.extend(ids(&completed));
    classified.extend(ids(&failed));
    classified.sort();
    let unique: HashSet<_> = classified.iter().copied().collect();
    assert_eq!(unique.len(), classified.len(), "a job appeared in two classes");
    assert_eq!(classified, ids(&all), "classes must cover all jobs");

    for class in JobClass::ALL {
        assert_eq!(
            store.by_class(class, None).expect("by_class"),
            all.iter().filter(|job| job.class() == class).cloned().collect::<Vec<_>>()
        );
    }
}

pub fn worker_filter_is_exact_subset(store: &dyn JobStore) {
    seed_mixed(store);
    store.insert(Job::new("Email", json!("prefix"))).expect("insert");
    let all = store.all(None).expect("all");

    for worker in ["Emailer", "Reporter", "Billing", "Email", "Nobody"] {
        let expected: Vec<Job> = all.iter().filter(|job| job.worker == worker).cloned().collect();
        assert_eq!(store.all(Some(worker)).expect("all(worker)"), expected);

        let split = [
            store.incomplete(Some(worker)).expect("incomplete(worker)"),
            store.completed(Some(worker)).expect("completed(worker)"),
            store.failed(Some(worker)).expect("failed(worker)"),
        ];
        for listing in &split {
            assert!(listing.iter().all(|job| job.worker == worker));
        }
        assert_eq!(split.iter().map(Vec::len).sum::<usize>(), expected.len());
    }

    assert!(store.all(Some("Nobody")).expect("all").is_empty());
}

pub fn listings_are_ordered_by_id(store: &dyn JobStore) {
    seed_mixed(store);
    store
        .update(Job::new("Emailer", json!("late")).with_id(JobId::new(500)))
        .expect("update");
    store.insert(Job::new("Emailer", json!("after"))).expect("insert");

    let listings = [
        store.all(None).expect("all"),
        store.all(Some("Emailer")).expect("all(worker)"),
        store.incomplete(None).expect("incomplete"),
        store.failed(None).expect("failed"),
    ];
    for listing in listings {
        let got = ids(&listing);
        let mut sorted = got.clone();
        sorted.sort();
        assert_eq!(got, sorted);
    }
}

pub fn initialize_is_idempotent(store: &dyn JobStore) {
    let stored = store.insert(Job::new("Emailer", json!(1))).expect("insert");

    store.initialize().expect("first re-initialize");
    store.initialize().expect("second re-initialize");

    assert_eq!(store.find(stored.id.expect("id")).expect("find"), Some(stored.clone()));
    assert_eq!(store.all(None).expect("all"), vec![stored]);
}

pub fn stats_match_listings(store: &dyn JobStore) {
    seed_mixed(store);

    for worker in [None, Some("Emailer"), Some("Reporter"), Some("Nobody")] {
        let stats = store.stats(worker).expect("stats");
        let all = store.all(worker).expect("all");
        assert_eq!(stats, all.iter().collect::<JobStats>());
        assert_eq!(stats.incomplete(), store.incomplete(worker).expect("incomplete").len());
        assert_eq!(stats.completed, store.completed(worker).expect("completed").len());
        assert_eq!(stats.failed, store.failed(worker).expect("failed").len());
        assert_eq!(stats.total(), all.len());
    }
}

pub fn arguments_are_stored_verbatim(store: &dyn JobStore) {
    let payloads = [
        json!(null),
        json!("plain text"),
        json!(["a@example.com", 3, 4.5, true]),
        json!({ "nested": { "list": [1, { "deep": null }] }, "unicode": "ジョブ ✓" }),
    ];

    for arguments in payloads {
        let stored = store.insert(Job::new("Emailer", arguments.clone())).expect("insert");
        let found = store.find(stored.id.expect("id")).expect("find").expect("present");
        assert_eq!(found.arguments, arguments);
    }
}

pub fn emailer_lifecycle(store: &dyn JobStore) {
    let job = Job::new("Emailer", json!(["a@example.com"]));
    let stored = store.insert(job).expect("insert");
    let id = stored.id.expect("fresh id");

    assert!(store.completed(None).expect("completed").is_empty());
    assert_eq!(ids(&store.incomplete(None).expect("incomplete")), vec![id]);

    let started = store
        .update(stored.clone().with_status(JobStatus::Started))
        .expect("update to started");
    assert_eq!(started.id, Some(id));
    assert_eq!(ids(&store.incomplete(None).expect("incomplete")), vec![id]);

    store
        .update(stored.clone().with_status(JobStatus::Completed))
        .expect("update to completed");
    assert_eq!(ids(&store.completed(None).expect("completed")), vec![id]);
    assert!(store.incomplete(None).expect("incomplete").is_empty());
    assert!(store.failed(None).expect("failed").is_empty());

    store.destroy(id).expect("destroy");
    assert_eq!(store.find(id).expect("find"), None);
    assert!(store.all(None).expect("all").is_empty());
    assert!(store.completed(None).expect("completed").is_empty());
    assert!(store.incomplete(None).expect("incomplete").is_empty());
    assert!(store.failed(None).expect("failed").is_empty());
}

/// Generate one `#[test]` per contract check for a backend.
///
/// `$make` must evaluate to a fresh, empty store; it is called once per test
/// and the store is initialized before the check runs.
#[macro_export]
macro_rules! job_store_contract_tests {
    ($make:expr) => {
        mod contract {
            #[allow(unused_imports)]
            use super::*;
            #[allow(unused_imports)]
            use $crate::store::JobStore as _;

            fn fresh() -> impl $crate::store::JobStore {
                let store = $make;
                store.initialize().expect("initialize store");
                store
            }

            $crate::job_store_contract_tests!(@checks
                insert_assigns_fresh_ids,
                insert_rejects_job_with_id,
                find_unknown_id_is_none,
                unstorable_ids_are_absent_and_unwritable,
                update_overwrites_existing_job,
                update_without_id_inserts,
                update_unknown_id_inserts_under_that_id,
                destroy_removes_job,
                destroy_unknown_id_is_noop,
                destroyed_ids_are_not_reused,
                classes_partition_all_jobs,
                worker_filter_is_exact_subset,
                listings_are_ordered_by_id,
                initialize_is_idempotent,
                stats_match_listings,
                arguments_are_stored_verbatim,
                emailer_lifecycle,
            );
        }
    };
    (@checks $($check:ident),* $(,)?) => {
        $(
            #[test]
            fn $check() {
                let store = fresh();
                $crate::store::conformance::$check(&store);
            }
        )*
    };
}
