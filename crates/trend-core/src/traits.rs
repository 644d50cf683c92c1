//! Core traits for repotrend abstractions.
//!
//! These traits define the seams between workers, storage, and the external
//! sources, enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORE
// =============================================================================

/// Repository persistence plus the discovery transaction.
#[async_trait]
pub trait RepoRepository: Send + Sync {
    /// Record one discovery run as a single atomic unit: insert candidates
    /// (silently skipping (full_name, owner) conflicts), enqueue one
    /// conversion job per *newly inserted* repo preserving index
    /// correspondence, and create one pending context row per new repo
    /// carrying that repo's job id. All of it commits or none of it does.
    async fn record_trending(&self, candidates: Vec<NewRepo>) -> Result<DiscoveryOutcome>;

    /// Enqueue a fresh conversion for an already-known repo: one new job
    /// plus one new pending context row carrying its id, committed
    /// together so the job is never claimable before its row exists.
    /// Existing context rows keep their job ids untouched. Unknown ids
    /// error with `RepoNotFound`.
    async fn reconvert(&self, repo_id: Uuid, branch: &str) -> Result<Uuid>;

    /// Get a repository by id.
    async fn get(&self, id: Uuid) -> Result<Option<Repo>>;

    /// List repositories, newest and most-starred first.
    async fn list(&self, limit: i64) -> Result<Vec<Repo>>;
}

/// Context (enrichment record) persistence.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Set the content of the context row whose job id matches, stamping
    /// updated_at. Returns the number of rows touched; 0 means the
    /// correlation key resolves to nothing (a linkage miss).
    async fn complete_by_job(&self, job_id: Uuid, content: &str) -> Result<u64>;

    /// Contexts still pending whose job can no longer deliver: the linked
    /// job is permanently failed or gone, and the row is older than
    /// `older_than`. These are the reconciliation sweep's work list.
    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<RepoContext>>;

    /// All contexts for a repo, newest first.
    async fn list_for_repo(&self, repo_id: Uuid) -> Result<Vec<RepoContext>>;
}

// =============================================================================
// QUEUE
// =============================================================================

/// Durable, named work queue.
///
/// Exclusively owns job state: handlers observe ids and outcomes but never
/// move jobs between statuses themselves.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Place one unit of work. Returns once durably recorded; never blocks
    /// on downstream processing.
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: Option<JsonValue>,
        options: EnqueueOptions,
    ) -> Result<Uuid>;

    /// Batch enqueue. The returned ids preserve input order: index i of
    /// `payloads` corresponds to index i of the result.
    async fn enqueue_bulk(&self, kind: JobKind, payloads: Vec<JsonValue>) -> Result<Vec<Uuid>>;

    /// Claim the next runnable job whose kind is in `kinds`. An empty slice
    /// claims any kind. Honors priority ordering and `run_at` delays.
    async fn claim_next_for_kinds(&self, kinds: &[JobKind]) -> Result<Option<Job>>;

    /// Mark a job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job failed. Re-pends with exponential backoff while retries
    /// remain, otherwise fails it permanently.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Mark a job permanently failed, bypassing retries. For structural
    /// errors where reprocessing cannot succeed.
    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Get a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue statistics summary.
    async fn stats(&self) -> Result<QueueStats>;

    /// Optional wake handle, notified when new work lands. Workers that get
    /// `None` fall back to pure polling.
    fn wake_handle(&self) -> Option<std::sync::Arc<tokio::sync::Notify>> {
        None
    }
}

/// Recurring (cron) schedule persistence.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Idempotently (re-)install a recurring producer. Calling twice with
    /// the same id updates in place; it never creates a duplicate trigger.
    async fn upsert(
        &self,
        id: &str,
        cron_expr: &str,
        kind: JobKind,
        payload: Option<JsonValue>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Schedules whose next_run_at has passed.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<RecurringSchedule>>;

    /// Record a firing and set the next occurrence.
    async fn mark_fired(&self, id: &str, next_run_at: DateTime<Utc>) -> Result<()>;
}

// =============================================================================
// EXTERNAL SOURCES
// =============================================================================

/// Read-only query against the external trend source.
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Ranked candidates created after `since` with at least `min_stars`,
    /// at most `limit` of them.
    async fn trending(
        &self,
        since: DateTime<Utc>,
        min_stars: i64,
        limit: u32,
    ) -> Result<Vec<NewRepo>>;
}

/// Read-only fetch against the external content source. Side-effect-free
/// on the store.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Raw contents for (owner, name, branch). Sub-fetch failures degrade
    /// to empty fields; only total unavailability is an error.
    async fn contents(&self, owner: &str, name: &str, branch: &str)
        -> Result<RepositoryContents>;
}
