//! Postgres-backed job store.
//!
//! Ids come from the `BIGSERIAL` sequence on `jobs.id`. Sequences never hand a
//! value out twice, so destroyed ids stay retired. An `update` that writes an
//! explicit id beyond the sequence moves the sequence past it in the same
//! transaction.
//!
//! ## Thread Safety
//!
//! `PostgresJobStore` is `Send + Sync`. Calls block on the store's own runtime,
//! so it must not be used from inside an async task.

use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tokio::runtime::Runtime;
use tracing::{debug, instrument};

use jobforge_core::{Job, JobClass, JobId};

use super::r#trait::{InitError, JobStats, JobStore, StoreError};
use super::row::{self, JobRow, map_sqlx_error, store_runtime};

const BACKEND: &str = "postgres";

/// Advisory lock key serializing sequence adjustments.
const SEQUENCE_LOCK: i64 = 0x6a6f_6266_6f72_6765;

/// Postgres job store.
#[derive(Debug)]
pub struct PostgresJobStore {
    pool: PgPool,
    runtime: Runtime,
}

impl PostgresJobStore {
    /// Connect to `url` with a pool of at most `max_connections`.
    pub fn connect(url: &str, max_connections: u32) -> Result<Self, InitError> {
        let runtime = store_runtime()?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect(url),
            )
            .map_err(|e| InitError::Connect {
                backend: BACKEND,
                message: e.to_string(),
            })?;

        debug!(backend = BACKEND, max_connections, "connection pool ready");
        Ok(Self { pool, runtime })
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id        BIGSERIAL PRIMARY KEY,
                worker    TEXT NOT NULL,
                arguments JSONB NOT NULL,
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
            sqlx::query_as("SELECT id, worker, arguments, status FROM jobs WHERE id = $1")
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
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("destroy", e))?;

        debug!(job_id = %id, existed = result.rows_affected() > 0, "job destroyed");
        Ok(())
    }

    #[instrument(skip(self, job), fields(worker = %job.worker), err)]
    async fn insert_job(&self, mut job: Job) -> Result<Job, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO jobs (worker, arguments, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&job.worker)
        .bind(Json(&job.arguments))
        .bind(job.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;

        let id = u64::try_from(id)
            .map_err(|_| StoreError::Corrupt(format!("sequence produced negative id {id}")))?;
        job.id = Some(JobId::new(id));

        debug!(job_id = id, status = %job.status, "job inserted");
        Ok(job)
    }

    #[instrument(skip(self, id, job), fields(job_id = %id, worker = %job.worker), err)]
    async fn upsert_job(&self, id: JobId, job: Job) -> Result<Job, StoreError> {
        let sql_id = row::sql_id(id)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("update", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEQUENCE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update", e))?;

        // Only ever moves the sequence forward: `next` is the value nextval would return.
        sqlx::query(
            r#"
            SELECT setval(pg_get_serial_sequence('jobs', 'id'), $1)
            FROM (
                SELECT CASE WHEN is_called THEN last_value + 1 ELSE last_value END AS next
                FROM jobs_id_seq
            ) seq
            WHERE $1 >= seq.next
            "#,
        )
        .bind(sql_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, worker, arguments, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                worker = EXCLUDED.worker,
                arguments = EXCLUDED.arguments,
                status = EXCLUDED.status
            "#,
        )
        .bind(sql_id)
        .bind(&job.worker)
        .bind(Json(&job.arguments))
        .bind(job.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        tx.commit()
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
            WHERE ($1::text IS NULL OR worker = $1)
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
        let statuses: Vec<&str> = class.statuses().iter().map(|s| s.as_str()).collect();
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, worker, arguments, status
            FROM jobs
            WHERE ($1::text IS NULL OR worker = $1)
              AND status = ANY($2)
            ORDER BY id ASC
            "#,
        )
        .bind(worker)
        .bind(statuses)
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
            WHERE ($1::text IS NULL OR worker = $1)
            GROUP BY status
            "#,
        )
        .bind(worker)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        row::into_stats(rows)
    }

    /// Remove every row, leaving the id sequence where it is.
    #[cfg(test)]
    fn truncate(&self) -> Result<(), StoreError> {
        self.runtime
            .block_on(sqlx::query("TRUNCATE jobs").execute(&self.pool))
            .map(|_| ())
            .map_err(|e| map_sqlx_error("truncate", e))
    }
}

impl JobStore for PostgresJobStore {
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
    use crate::store::conformance;

    /// Runs the shared store checks against a live database.
    ///
    /// Set `JOBFORGE_TEST_DATABASE_URL` to a disposable database to enable it.
    #[test]
    fn contract_against_live_database() {
        let Ok(url) = std::env::var("JOBFORGE_TEST_DATABASE_URL") else {
            eprintln!("JOBFORGE_TEST_DATABASE_URL not set; skipping postgres contract test");
            return;
        };

        let store = PostgresJobStore::connect(&url, 2).expect("connect to test database");
        store.initialize().expect("initialize schema");

        conformance::run_all(&store, || store.truncate().expect("truncate jobs"));
    }

    #[test]
    fn unreachable_database_is_a_connect_error() {
        let err = PostgresJobStore::connect("not a url", 1).unwrap_err();
        assert!(matches!(err, InitError::Connect { backend: "postgres", .. }));
    }
}
