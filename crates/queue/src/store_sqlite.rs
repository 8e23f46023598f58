//! SQLite-backed job store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{
    Result,
    error::Error,
    store::JobStore,
    types::{Job, RetryPolicy},
};

/// Durable delivery queue on the shared courier database.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the delivery-jobs schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS delivery_jobs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT    NOT NULL,
                payload         TEXT    NOT NULL,
                attempts        INTEGER NOT NULL DEFAULT 0,
                max_attempts    INTEGER NOT NULL,
                backoff_base_ms INTEGER NOT NULL,
                state           TEXT    NOT NULL DEFAULT 'pending',
                enqueued_at_ms  INTEGER NOT NULL,
                due_at_ms       INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_delivery_jobs_due
             ON delivery_jobs (state, due_at_ms, id)",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    fn job_from_row(row: &SqliteRow) -> Result<Job> {
        let payload: String = row.get("payload");
        Ok(Job {
            id: row.get("id"),
            name: row.get("name"),
            payload: serde_json::from_str(&payload)?,
            attempts: row.get::<i64, _>("attempts").max(0) as u32,
            policy: RetryPolicy {
                max_attempts: row.get::<i64, _>("max_attempts").max(0) as u32,
                backoff_base_ms: row.get::<i64, _>("backoff_base_ms").max(0) as u64,
            },
            enqueued_at_ms: row.get("enqueued_at_ms"),
            due_at_ms: row.get("due_at_ms"),
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        policy: RetryPolicy,
    ) -> Result<Job> {
        let now = chrono::Utc::now().timestamp_millis();
        let data = serde_json::to_string(&payload)?;
        let row = sqlx::query(
            "INSERT INTO delivery_jobs (name, payload, max_attempts, backoff_base_ms, enqueued_at_ms, due_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(name)
        .bind(&data)
        .bind(policy.max_attempts as i64)
        .bind(policy.backoff_base_ms as i64)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Self::job_from_row(&row)
    }

    async fn claim_due(&self, now_ms: i64) -> Result<Option<Job>> {
        // Single-statement claim so two workers can never grab the same job.
        let row = sqlx::query(
            "UPDATE delivery_jobs
             SET state = 'active', attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM delivery_jobs
                 WHERE state = 'pending' AND due_at_ms <= ?
                 ORDER BY due_at_ms, id
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn complete(&self, job_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM delivery_jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn reschedule(&self, job_id: i64, due_at_ms: i64) -> Result<()> {
        let result =
            sqlx::query("UPDATE delivery_jobs SET state = 'pending', due_at_ms = ? WHERE id = ?")
                .bind(due_at_ms)
                .bind(job_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::job_not_found(job_id));
        }
        Ok(())
    }

    async fn discard(&self, job_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM delivery_jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn next_due_at(&self) -> Result<Option<i64>> {
        let row =
            sqlx::query("SELECT MIN(due_at_ms) AS due FROM delivery_jobs WHERE state = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.get::<Option<i64>, _>("due"))
    }

    async fn pending_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM delivery_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }

    async fn release_claimed(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE delivery_jobs SET state = 'pending' WHERE state = 'active'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
