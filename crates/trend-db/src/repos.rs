//! Repository persistence and the discovery transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use trend_core::{
    defaults, new_v7, DiscoveryOutcome, Error, JobKind, JobPayload, NewRepo, Repo, RepoRepository,
    Result,
};

use crate::jobs::PgJobQueue;

const REPO_COLUMNS: &str = "id, name, owner, full_name, description, stars, url, language, \
     avatar_url, created_at, updated_at";

/// PostgreSQL implementation of RepoRepository.
pub struct PgRepoRepository {
    pool: Pool<Postgres>,
    /// Shared with the job queue so a committed discovery wakes workers.
    job_notify: Arc<Notify>,
}

impl PgRepoRepository {
    pub fn new(pool: Pool<Postgres>, job_notify: Arc<Notify>) -> Self {
        Self { pool, job_notify }
    }

    fn parse_repo_row(row: sqlx::postgres::PgRow) -> Repo {
        Repo {
            id: row.get("id"),
            name: row.get("name"),
            owner: row.get("owner"),
            full_name: row.get("full_name"),
            description: row.get("description"),
            stars: row.get("stars"),
            url: row.get("url"),
            language: row.get("language"),
            avatar_url: row.get("avatar_url"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Insert one candidate, returning the row only when it was actually
    /// inserted. A (full_name, owner) conflict returns None: re-discovery
    /// is idempotent, duplicates are skipped silently.
    async fn insert_candidate_on(conn: &mut PgConnection, repo: &NewRepo) -> Result<Option<Repo>> {
        let query = format!(
            "INSERT INTO repo (id, name, owner, full_name, description, stars, url, language, avatar_url, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (full_name, owner) DO NOTHING
             RETURNING {REPO_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(&repo.name)
            .bind(&repo.owner)
            .bind(&repo.full_name)
            .bind(&repo.description)
            .bind(repo.stars)
            .bind(&repo.url)
            .bind(&repo.language)
            .bind(&repo.avatar_url)
            .bind(Utc::now())
            .fetch_optional(&mut *conn)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_repo_row))
    }
}

#[async_trait]
impl RepoRepository for PgRepoRepository {
    async fn record_trending(&self, candidates: Vec<NewRepo>) -> Result<DiscoveryOutcome> {
        // Zero candidates: no-op, no transaction needed.
        if candidates.is_empty() {
            return Ok(DiscoveryOutcome::default());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Insert candidates; conflicts (already-known repos) drop out here.
        let mut inserted = Vec::new();
        for candidate in &candidates {
            if let Some(repo) = Self::insert_candidate_on(&mut *tx, candidate).await? {
                inserted.push(repo);
            }
        }

        // One conversion job per newly inserted repo, ids index-aligned.
        let mut job_ids = Vec::with_capacity(inserted.len());
        for repo in &inserted {
            let payload = serde_json::to_value(JobPayload::Convert {
                repo_id: repo.id,
                repo: repo.metadata(),
                branch: defaults::CONTEXT_BRANCH.to_string(),
            })?;
            let job_id = PgJobQueue::insert_job_on(
                &mut *tx,
                JobKind::Convert,
                Some(&payload),
                JobKind::Convert.default_priority(),
                Utc::now(),
            )
            .await?;
            job_ids.push(job_id);
        }

        // One pending context row per new repo, carrying its job id. A
        // freshly discovered repo is never observable without its context.
        for (repo, job_id) in inserted.iter().zip(&job_ids) {
            sqlx::query(
                "INSERT INTO repo_context (id, repo_id, format, branch, job_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(new_v7())
            .bind(repo.id)
            .bind(defaults::CONTEXT_FORMAT)
            .bind(defaults::CONTEXT_BRANCH)
            .bind(job_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        // Jobs are only visible to workers after commit.
        self.job_notify.notify_waiters();

        info!(
            subsystem = "db",
            op = "record_trending",
            candidates = candidates.len(),
            result_count = inserted.len(),
            "Recorded discovery run"
        );
        debug!(
            subsystem = "db",
            op = "record_trending",
            skipped = candidates.len() - inserted.len(),
            "Conflict duplicates skipped"
        );

        Ok(DiscoveryOutcome { inserted, job_ids })
    }

    async fn reconvert(&self, repo_id: Uuid, branch: &str) -> Result<Uuid> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let query = format!("SELECT {REPO_COLUMNS} FROM repo WHERE id = $1");
        let repo = sqlx::query(&query)
            .bind(repo_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .map(Self::parse_repo_row)
            .ok_or(Error::RepoNotFound(repo_id))?;

        let payload = serde_json::to_value(JobPayload::Convert {
            repo_id,
            repo: repo.metadata(),
            branch: branch.to_string(),
        })?;
        let job_id = PgJobQueue::insert_job_on(
            &mut *tx,
            JobKind::Convert,
            Some(&payload),
            JobKind::Convert.default_priority(),
            Utc::now(),
        )
        .await?;

        sqlx::query(
            "INSERT INTO repo_context (id, repo_id, format, branch, job_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(new_v7())
        .bind(repo_id)
        .bind(defaults::CONTEXT_FORMAT)
        .bind(branch)
        .bind(job_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        self.job_notify.notify_waiters();

        info!(
            subsystem = "db",
            op = "reconvert",
            repo_id = ?repo_id,
            job_id = ?job_id,
            "Reissued conversion with linked context"
        );

        Ok(job_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Repo>> {
        let query = format!("SELECT {REPO_COLUMNS} FROM repo WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_repo_row))
    }

    async fn list(&self, limit: i64) -> Result<Vec<Repo>> {
        let query = format!(
            "SELECT {REPO_COLUMNS} FROM repo
             ORDER BY updated_at DESC NULLS LAST, created_at DESC, stars DESC
             LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(Self::parse_repo_row).collect())
    }
}
