//! Recurring (cron) schedule persistence.
//!
//! Upsert keyed on the schedule id keeps installs idempotent: re-running
//! process startup updates the stored cron expression in place instead of
//! stacking duplicate triggers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};

use trend_core::{Error, JobKind, RecurringSchedule, Result, ScheduleRepository};

/// PostgreSQL implementation of ScheduleRepository.
pub struct PgScheduleRepository {
    pool: Pool<Postgres>,
}

impl PgScheduleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_schedule_row(row: sqlx::postgres::PgRow) -> Result<RecurringSchedule> {
        let kind: String = row.get("kind");
        Ok(RecurringSchedule {
            id: row.get("id"),
            cron_expr: row.get("cron_expr"),
            kind: serde_json::from_value(JsonValue::String(kind))?,
            payload: row.get("payload"),
            next_run_at: row.get("next_run_at"),
            last_run_at: row.get("last_run_at"),
        })
    }

    fn kind_str(kind: JobKind) -> Result<String> {
        match serde_json::to_value(kind)? {
            JsonValue::String(s) => Ok(s),
            other => Err(Error::Serialization(format!(
                "job kind did not serialize to a string: {other}"
            ))),
        }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn upsert(
        &self,
        id: &str,
        cron_expr: &str,
        kind: JobKind,
        payload: Option<JsonValue>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_schedule (id, cron_expr, kind, payload, next_run_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE
             SET cron_expr = EXCLUDED.cron_expr,
                 kind = EXCLUDED.kind,
                 payload = EXCLUDED.payload,
                 next_run_at = EXCLUDED.next_run_at",
        )
        .bind(id)
        .bind(cron_expr)
        .bind(Self::kind_str(kind)?)
        .bind(payload)
        .bind(next_run_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<RecurringSchedule>> {
        let rows = sqlx::query(
            "SELECT id, cron_expr, kind, payload, next_run_at, last_run_at
             FROM job_schedule
             WHERE next_run_at <= $1
             ORDER BY next_run_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_schedule_row).collect()
    }

    async fn mark_fired(&self, id: &str, next_run_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE job_schedule SET last_run_at = $1, next_run_at = $2 WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(next_run_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
