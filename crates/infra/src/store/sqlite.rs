//! SQLite-backed job store.
//!
//! Jobs live in a single `jobs` table. `AUTOINCREMENT` keeps ids monotonic
//! across deletes, and an explicit id written through `update` moves the
//! sequence forward on its own.
//!
//! The store owns a small tokio runtime and blocks on it for each call, so it
//! must not be used from inside an async task.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

use jobforge_core::{Job, JobClass, JobId};

use super::r#trait::{InitError, JobStats, JobStore, StoreError};
use super::row::{self, JobRow, map_sqlx_error, store_runtime};

const BACKEND: &str = "sqlite";

/// SQLite job store.
#[derive(Debug)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    runtime: Runtime,
}

impl SqliteJobStore {
    /// Connect to a SQLite URL such as `sqlite://jobforge.db?mode=rwc`.
    pub fn connect(url: &str, max_connections: u32) -> Result<Self, InitError> {
        let options = SqliteConnectOptions::from_str(url).map_err(|e| InitError::Connect {
            backend: BACKEND,
            message: format!("invalid url {url}: {e}"),
        })?;
        Self::with_options(options, SqlitePoolOptions::new().max_connections(max_connections))
    }

    /// Open (creating if missing) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InitError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::with_options(options, SqlitePoolOptions::new())
    }

    /// Private in-memory database. Lives as long as the store.
    pub fn in_memory() -> Result<Self, InitError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            InitError::Connect {
                backend: BACKEND,
                message: e.to_string(),
            }
        })?;
        // Every connection to `:memory:` is its own database, so pin exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::with_options(options, pool)
    }

    fn with_options(
        options: SqliteConnectOptions,
        pool: SqlitePoolOptions,
    ) -> Result<Self, InitError> {
        let runtime = store_runtime()?;
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = runtime
            .block_on(pool.connect_with(options))
            .map_err(|e| InitError::Connect {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        debug!(backend = BACKEND, "connection pool ready");
        Ok(Self { pool, runtime })
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                worker    TEXT NOT NULL,
                arguments TEXT NOT NULL,
                status    TEXT NOT NULL {}
            )
            "#,
            row::status_check()
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .context("failed to create jobs table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_worker_idx ON jobs (worker)")
            .execute(&self.pool)
            .await
            .context("failed to create jobs_worker_idx")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_status_idx ON jobs (status)")
            .execute(&self.pool)
            .await
            .context("failed to create jobs_status_idx")?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let Some(key) = row::lookup_id(id) else {
            return Ok(None);
        };
        let row: Option<JobRow> =
            sqlx::query_as("SELECT id, worker, arguments, status FROM jobs WHERE id = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find", e))?;

        row.map(Job::try_from).transpose()
    }

    #[instrument(skip(self), err)]
    async fn destroy_job(&self, id: JobId) -> Result<(), StoreError> {
        let Some(key) = row::lookup_id(id) else {
            debug!(job_id = %id, existed = false, "job destroyed");
            return Ok(());
        };
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("destroy", e))?;

        debug!(job_id = %id, existed = result.rows_affected() > 0, "job destroyed");
        Ok(())
    }

    #[instrument(skip(self, job), fields(worker = %job.worker), err)]
    async fn insert_job(&self, mut job: Job) -> Result<Job, StoreError> {
        let result = sqlx::query("INSERT INTO jobs (worker, arguments, status) VALUES (?1, ?2, ?3)")
            .bind(&job.worker)
            .bind(Json(&job.arguments))
            .bind(job.status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;

        let id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| StoreError::Corrupt("negative rowid after insert".to_string()))?;
        job.id = Some(JobId::new(id));

        debug!(job_id = id, status = %job.status, "job inserted");
        Ok(job)
    }

    #[instrument(skip(self, id, job), fields(job_id = %id, worker = %job.worker), err)]
    async fn upsert_job(&self, id: JobId, job: Job) -> Result<Job, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, worker, arguments, status)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                worker = excluded.worker,
                arguments = excluded.arguments,
                status = excluded.status
            "#,
        )
        .bind(row::sql_id(id)?)
        .bind(&job.worker)
        .bind(Json(&job.arguments))
        .bind(job.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        debug!(status = %job.status, "job upserted");
        Ok(job)
    }

    #[instrument(skip(self), err)]
    async fn list_jobs(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, worker, arguments, status
            FROM jobs
            WHERE (?1 IS NULL OR worker = ?1)
            ORDER BY id ASC
            "#,
        )
        .bind(worker)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("all", e))?;

        row::into_jobs(rows)
    }

    #[instrument(skip(self), err)]
    async fn list_class(
        &self,
        class: JobClass,
        worker: Option<&str>,
    ) -> Result<Vec<Job>, StoreError> {
        let (first, second) = row::class_statuses(class);
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, worker, arguments, status
            FROM jobs
            WHERE (?1 IS NULL OR worker = ?1)
              AND status IN (?2, ?3)
            ORDER BY id ASC
            "#,
        )
        .bind(worker)
        .bind(first)
        .bind(second)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("by_class", e))?;

        row::into_jobs(rows)
    }

    #[instrument(skip(self), err)]
    async fn count_jobs(&self, worker: Option<&str>) -> Result<JobStats, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM jobs
            WHERE (?1 IS NULL OR worker = ?1)
            GROUP BY status
            "#,
        )
        .bind(worker)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        row::into_stats(rows)
    }
}

impl JobStore for SqliteJobStore {
    fn initialize(&self) -> Result<(), InitError> {
        self.runtime
            .block_on(self.ensure_schema())
            .map_err(|e| InitError::Schema {
                backend: BACKEND,
                message: format!("{e:#}"),
            })?;
        debug!(backend = BACKEND, "store initialized");
        Ok(())
    }

    fn find(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.runtime.block_on(self.find_job(id))
    }

    fn destroy(&self, id: JobId) -> Result<(), StoreError> {
        self.runtime.block_on(self.destroy_job(id))
    }

    fn insert(&self, job: Job) -> Result<Job, StoreError> {
        if let Some(id) = job.id {
            return Err(StoreError::IdAlreadyAssigned(id));
        }
        self.runtime.block_on(self.insert_job(job))
    }

    fn update(&self, job: Job) -> Result<Job, StoreError> {
        match job.id {
            Some(id) => self.runtime.block_on(self.upsert_job(id, job)),
            None => self.runtime.block_on(self.insert_job(job)),
        }
    }

    fn all(&self, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.runtime.block_on(self.list_jobs(worker))
    }

    fn by_class(&self, class: JobClass, worker: Option<&str>) -> Result<Vec<Job>, StoreError> {
        self.runtime.block_on(self.list_class(class, worker))
    }

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, StoreError> {
        self.runtime.block_on(self.count_jobs(worker))
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use jobforge_core::JobStatus;

    crate::job_store_contract_tests!(
        SqliteJobStore::in_memory().expect("in-memory sqlite store")
    );

    #[test]
    fn jobs_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::open(&path).unwrap();
            store.initialize().unwrap();
            let job = store
                .insert(Job::new("Emailer", json!(["a@example.com"])))
                .unwrap();
            store
                .update(job.clone().with_status(JobStatus::Started))
                .unwrap();
            job.id.unwrap()
        };

        let store = SqliteJobStore::open(&path).unwrap();
        store.initialize().unwrap();

        let job = store.find(id).unwrap().expect("job persisted");
        assert_eq!(job.worker, "Emailer");
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(store.incomplete(Some("Emailer")).unwrap(), vec![job]);
    }

    #[test]
    fn reopened_file_does_not_reuse_destroyed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let destroyed = {
            let store = SqliteJobStore::open(&path).unwrap();
            store.initialize().unwrap();
            let job = store.insert(Job::new("a", json!(null))).unwrap();
            store.destroy(job.id.unwrap()).unwrap();
            job.id.unwrap()
        };

        let store = SqliteJobStore::open(&path).unwrap();
        store.initialize().unwrap();
        let next = store.insert(Job::new("a", json!(null))).unwrap();
        assert!(next.id.unwrap() > destroyed);
    }

    #[test]
    fn operations_before_initialize_fail_with_store_error() {
        let store = SqliteJobStore::in_memory().unwrap();
        assert!(store.all(None).is_err());
    }

    #[test]
    fn invalid_url_is_a_connect_error() {
        let err = SqliteJobStore::connect("postgres://not-sqlite", 1).unwrap_err();
        assert!(matches!(err, InitError::Connect { backend: "sqlite", .. }));
    }

    #[test]
    fn grouped_stats_match_listings() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.initialize().unwrap();
        for status in JobStatus::ALL {
            store
                .update(Job::new("Reporter", json!({})).with_status(status))
                .unwrap();
        }
        store.insert(Job::new("Emailer", json!({}))).unwrap();

        let stats = store.stats(Some("Reporter")).unwrap();
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.incomplete(), store.incomplete(Some("Reporter")).unwrap().len());
        assert_eq!(store.stats(None).unwrap().queued, 2);
    }
}
