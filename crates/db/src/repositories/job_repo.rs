//! Repository for the `jobs` table.
//!
//! Single-writer design: only the dispatch loop transitions jobs out of
//! `pending`, so claims need no cross-process locking -- the atomic
//! `UPDATE ... RETURNING` still guards against a concurrent recovery scan
//! racing the same row.

use chrono::Utc;

use airlock_core::types::new_job_id;

use crate::models::job::{Job, NewJob, PruneOutcome, QueueCounts};
use crate::models::status::JobStatus;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, status, payload, callback_mode, callback_target, \
    result_format, destination, result, created_at";

/// Provides the job store operations.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new `pending` job and return the stored row.
    ///
    /// The id (UUIDv4) and `created_at` are assigned here; `created_at` is
    /// the FIFO ordering key for the dispatch loop.
    pub async fn enqueue(pool: &DbPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (id, status, payload, callback_mode, callback_target, \
                  result_format, destination, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(new_job_id())
            .bind(JobStatus::Pending)
            .bind(&input.payload)
            .bind(input.callback_mode)
            .bind(input.callback_target.as_deref())
            .bind(input.result_format)
            .bind(input.destination.as_deref())
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest `pending` job, transitioning it to
    /// `processing`. Returns `None` when the queue is empty.
    ///
    /// Oldest means smallest `created_at`; `rowid` breaks ties in
    /// insertion order.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = ?1 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = ?2 \
                 ORDER BY created_at, rowid \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Processing)
            .bind(JobStatus::Pending)
            .fetch_optional(pool)
            .await
    }

    /// Transition a `processing` job to `completed` and store the result
    /// reference (serialized to JSON text).
    ///
    /// Returns whether a row changed. Calling on a job that is not
    /// `processing` is a no-op, which makes duplicate completion signals
    /// harmless and keeps `result` write-once.
    pub async fn complete(
        pool: &DbPool,
        job_id: &str,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = ?1, result = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(JobStatus::Completed)
        .bind(result)
        .bind(job_id)
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Transition a `processing` job to `failed` and store the diagnostic
    /// text. Same idempotency contract as [`JobRepo::complete`].
    pub async fn fail(pool: &DbPool, job_id: &str, detail: &str) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs SET status = ?1, result = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(JobStatus::Failed)
        .bind(detail)
        .bind(job_id)
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Fetch a job by id.
    pub async fn find_by_id(pool: &DbPool, job_id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Pending/processing totals for the status endpoint.
    pub async fn counts(pool: &DbPool) -> Result<QueueCounts, sqlx::Error> {
        sqlx::query_as::<_, QueueCounts>(
            "SELECT \
                 COUNT(*) FILTER (WHERE status = ?1) AS pending, \
                 COUNT(*) FILTER (WHERE status = ?2) AS processing \
             FROM jobs",
        )
        .bind(JobStatus::Pending)
        .bind(JobStatus::Processing)
        .fetch_one(pool)
        .await
    }

    /// Remove old rows under the two retention windows: `completed` jobs
    /// older than `completed_retention`, then jobs of any status older
    /// than `full_retention`. Run once at startup.
    pub async fn prune(
        pool: &DbPool,
        completed_retention: chrono::Duration,
        full_retention: chrono::Duration,
    ) -> Result<PruneOutcome, sqlx::Error> {
        let now = Utc::now();

        let completed = sqlx::query("DELETE FROM jobs WHERE status = ?1 AND created_at < ?2")
            .bind(JobStatus::Completed)
            .bind(now - completed_retention)
            .execute(pool)
            .await?;

        let expired = sqlx::query("DELETE FROM jobs WHERE created_at < ?1")
            .bind(now - full_retention)
            .execute(pool)
            .await?;

        let outcome = PruneOutcome {
            completed_removed: completed.rows_affected(),
            expired_removed: expired.rows_affected(),
        };
        tracing::debug!(
            completed_removed = outcome.completed_removed,
            expired_removed = outcome.expired_removed,
            "Job retention pass finished",
        );
        Ok(outcome)
    }
}
