//! Context (enrichment record) persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use trend_core::{ContextRepository, Error, RepoContext, Result};

const CONTEXT_COLUMNS: &str =
    "id, repo_id, format, branch, content, other, job_id, created_at, updated_at";

/// PostgreSQL implementation of ContextRepository.
pub struct PgContextRepository {
    pool: Pool<Postgres>,
}

impl PgContextRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_context_row(row: sqlx::postgres::PgRow) -> RepoContext {
        RepoContext {
            id: row.get("id"),
            repo_id: row.get("repo_id"),
            format: row.get("format"),
            branch: row.get("branch"),
            content: row.get("content"),
            other: row.get("other"),
            job_id: row.get("job_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl ContextRepository for PgContextRepository {
    async fn complete_by_job(&self, job_id: Uuid, content: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE repo_context SET content = $1, updated_at = $2 WHERE job_id = $3",
        )
        .bind(content)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            op = "complete_by_job",
            job_id = %job_id,
            result_count = result.rows_affected(),
            "Context completion by correlation key"
        );
        Ok(result.rows_affected())
    }

    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<RepoContext>> {
        // Pending rows whose job is permanently failed or missing, and for
        // whose repo no newer context exists (so one sweep replacement per
        // repo, not one per sweep run).
        let query = format!(
            "SELECT {CONTEXT_COLUMNS} FROM repo_context c
             WHERE c.content IS NULL
               AND c.created_at < $1
               AND NOT EXISTS (
                   SELECT 1 FROM job_queue j
                   WHERE j.id = c.job_id AND j.status IN ('pending', 'running')
               )
               AND NOT EXISTS (
                   SELECT 1 FROM repo_context newer
                   WHERE newer.repo_id = c.repo_id AND newer.created_at > c.created_at
               )
             ORDER BY c.created_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(older_than)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(Self::parse_context_row).collect())
    }

    async fn list_for_repo(&self, repo_id: Uuid) -> Result<Vec<RepoContext>> {
        let query = format!(
            "SELECT {CONTEXT_COLUMNS} FROM repo_context
             WHERE repo_id = $1
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(repo_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(Self::parse_context_row).collect())
    }
}
