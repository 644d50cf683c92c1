//! Durable job queue implementation.
//!
//! PostgreSQL-backed queue with `FOR UPDATE SKIP LOCKED` claiming, bounded
//! retries with exponential backoff, and a `Notify` handle for event-driven
//! worker wake. Because the queue shares the application's database, bulk
//! enqueue can run on a caller-owned transaction, making the discovery
//! insert + enqueue + link sequence atomic.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tokio::sync::Notify;
use uuid::Uuid;

use trend_core::{
    defaults, new_v7, EnqueueOptions, Error, Job, JobKind, JobQueue, JobStatus, QueueStats, Result,
};

const JOB_COLUMNS: &str = "id, kind, status, priority, payload, error_message, \
     retry_count, max_retries, run_at, created_at, started_at, completed_at";

/// PostgreSQL implementation of the JobQueue trait.
pub struct PgJobQueue {
    pool: Pool<Postgres>,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

/// Compute when a failed job becomes claimable again: base * 2^retry_count
/// after `now`.
pub fn retry_backoff(now: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
    let exp = retry_count.clamp(0, 16) as u32;
    now + Duration::seconds(defaults::JOB_RETRY_BASE_SECS * i64::from(2u32.pow(exp)))
}

impl PgJobQueue {
    /// Create a new PgJobQueue with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn kind_to_str(kind: JobKind) -> &'static str {
        match kind {
            JobKind::TrendDiscovery => "trend_discovery",
            JobKind::Convert => "convert",
            JobKind::Reconcile => "reconcile",
        }
    }

    fn str_to_kind(s: &str) -> Result<JobKind> {
        match s {
            "trend_discovery" => Ok(JobKind::TrendDiscovery),
            "convert" => Ok(JobKind::Convert),
            "reconcile" => Ok(JobKind::Reconcile),
            other => Err(Error::Job(format!("unknown job kind in queue: {other}"))),
        }
    }

    fn status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn str_to_status(s: &str) -> Result<JobStatus> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Job(format!("unknown job status in queue: {other}"))),
        }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        Ok(Job {
            id: row.get("id"),
            kind: Self::str_to_kind(row.get("kind"))?,
            status: Self::str_to_status(row.get("status"))?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            run_at: row.get("run_at"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// Insert one job on an existing connection (or transaction). Used by
    /// the discovery store to enqueue inside its transaction.
    pub async fn insert_job_on(
        conn: &mut PgConnection,
        kind: JobKind,
        payload: Option<&JsonValue>,
        priority: i32,
        run_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        sqlx::query(
            "INSERT INTO job_queue (id, kind, status, priority, payload, max_retries, run_at, created_at)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7)",
        )
        .bind(job_id)
        .bind(Self::kind_to_str(kind))
        .bind(priority)
        .bind(payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(run_at)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(job_id)
    }

    /// Wake sleeping workers after out-of-band inserts (e.g. the discovery
    /// transaction committing conversion jobs).
    pub fn notify_waiters(&self) {
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: Option<JsonValue>,
        options: EnqueueOptions,
    ) -> Result<Uuid> {
        let priority = options.priority.unwrap_or_else(|| kind.default_priority());
        let run_at = Utc::now() + Duration::seconds(options.delay_secs.unwrap_or(0));

        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let job_id =
            Self::insert_job_on(&mut *conn, kind, payload.as_ref(), priority, run_at).await?;
        drop(conn);

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn enqueue_bulk(&self, kind: JobKind, payloads: Vec<JsonValue>) -> Result<Vec<Uuid>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }

        let priority = kind.default_priority();
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut ids = Vec::with_capacity(payloads.len());
        // One insert per payload keeps returned ids index-aligned with input.
        for payload in &payloads {
            ids.push(Self::insert_job_on(&mut *tx, kind, Some(payload), priority, now).await?);
        }
        tx.commit().await.map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(ids)
    }

    async fn claim_next_for_kinds(&self, kinds: &[JobKind]) -> Result<Option<Job>> {
        let now = Utc::now();
        let kind_strings: Vec<String> = kinds
            .iter()
            .map(|k| Self::kind_to_str(*k).to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED lets concurrent workers claim without
        // serializing on each other. Filter by kind before locking; an
        // empty array claims any kind.
        let query = format!(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND run_at <= $1
                   AND (cardinality($2::text[]) = 0 OR kind = ANY($2))
                 ORDER BY priority DESC, run_at ASC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(&kind_strings)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue SET status = 'completed', completed_at = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if retry_count < max_retries {
            // Re-pend with backoff and an incremented retry count.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', retry_count = $1, error_message = $2,
                     started_at = NULL, run_at = $3
                 WHERE id = $4",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(retry_backoff(now, retry_count))
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            // Retries exhausted: surface for operator inspection, never delete.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'failed', completed_at = $1, error_message = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_job_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    fn wake_handle(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') as completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') as failed_last_hour,
                COUNT(*) as total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            running: row.get::<i64, _>("running"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }
}
