//! Core data models for repotrend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// REPOSITORIES
// =============================================================================

/// A discovered repository, persisted with a uniqueness guarantee on
/// (full_name, owner). Never deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stars: i64,
    pub url: String,
    pub language: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repo {
    /// The metadata view of a persisted row, as job payloads carry it.
    pub fn metadata(&self) -> NewRepo {
        NewRepo {
            name: self.name.clone(),
            owner: self.owner.clone(),
            full_name: self.full_name.clone(),
            description: self.description.clone(),
            stars: self.stars,
            url: self.url.clone(),
            language: self.language.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Insert shape for a repository, as returned by the trend source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepo {
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stars: i64,
    pub url: String,
    pub language: Option<String>,
    pub avatar_url: Option<String>,
}

/// The row holding asynchronously produced summary text for a repository.
///
/// Created in the same transaction as its parent repo insert, pending
/// (content NULL) until the conversion job keyed by `job_id` completes.
/// The job id, once set, is never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoContext {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub format: String,
    pub branch: String,
    pub content: Option<String>,
    pub other: Option<JsonValue>,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of one discovery transaction: the newly inserted subset (conflict
/// duplicates skipped) zipped index-for-index with the conversion job ids
/// enqueued for them.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub inserted: Vec<Repo>,
    pub job_ids: Vec<Uuid>,
}

// =============================================================================
// FETCHED CONTENTS
// =============================================================================

/// A file entry from a repository's root listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFile {
    pub name: String,
    pub path: String,
    pub size: i64,
    /// "file" or "dir" per the content source.
    pub kind: String,
    pub download_url: Option<String>,
}

impl RepoFile {
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// Raw contents fetched for a repository. Every field is best-effort: a
/// failed sub-fetch leaves its field empty/None rather than failing the
/// whole fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryContents {
    pub readme: Option<String>,
    pub files: Vec<RepoFile>,
    /// Language name -> byte volume.
    pub languages: std::collections::BTreeMap<String, i64>,
    pub topics: Vec<String>,
    pub license: Option<String>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Kind of job to process. Each kind has exactly one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Query the trend source, upsert repositories, enqueue conversions.
    TrendDiscovery,
    /// Fetch contents for one repository and write its summary.
    Convert,
    /// Re-enqueue conversion for contexts left pending by dead jobs.
    Reconcile,
}

impl JobKind {
    /// Default priority for this job kind (higher = more urgent).
    pub fn default_priority(&self) -> i32 {
        match self {
            // Discovery gates everything downstream
            JobKind::TrendDiscovery => 5,
            JobKind::Convert => 3,
            // Sweep is background housekeeping
            JobKind::Reconcile => 1,
        }
    }
}

/// Typed job payload. The queue stores this as JSON; the tag keeps the two
/// real payload shapes apart at compile time instead of sniffing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// A clock tick or manual request. Carries nothing.
    DiscoveryTrigger,
    /// Identity and metadata of the repository to convert. Carries the full
    /// metadata so the summary renderer never re-reads the store.
    Convert {
        repo_id: Uuid,
        repo: NewRepo,
        branch: String,
    },
    /// Sweep trigger. Carries nothing.
    ReconcileTrigger,
}

/// A job in the processing queue.
///
/// Owned by the queue layer: application code enqueues and observes, the
/// queue alone moves jobs between statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Not claimable before this instant (enqueue delay / retry backoff).
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the typed payload, if present.
    pub fn typed_payload(&self) -> crate::Result<Option<JobPayload>> {
        match &self.payload {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }
}

/// Options for a single enqueue.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Higher claims first. Defaults to the kind's default priority when None.
    pub priority: Option<i32>,
    /// Delay (seconds) before the job becomes claimable.
    pub delay_secs: Option<i64>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}

// =============================================================================
// RECURRING SCHEDULES
// =============================================================================

/// A cron-driven recurring producer of jobs, installed idempotently by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: String,
    pub cron_expr: String,
    pub kind: JobKind,
    pub payload: Option<JsonValue>,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_tagged_encoding() {
        let p = JobPayload::Convert {
            repo_id: Uuid::nil(),
            repo: NewRepo {
                name: "rust".into(),
                owner: "rust-lang".into(),
                full_name: "rust-lang/rust".into(),
                description: None,
                stars: 1,
                url: "https://github.com/rust-lang/rust".into(),
                language: None,
                avatar_url: None,
            },
            branch: "main".into(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["kind"], "convert");
        assert_eq!(v["repo"]["full_name"], "rust-lang/rust");

        let back: JobPayload = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_job_payload_trigger_is_bare() {
        let v = serde_json::to_value(JobPayload::DiscoveryTrigger).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "discovery_trigger"}));
    }

    #[test]
    fn test_typed_payload_none() {
        let job = Job {
            id: Uuid::new_v4(),
            kind: JobKind::TrendDiscovery,
            status: JobStatus::Pending,
            priority: 0,
            payload: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            run_at: Utc::now(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        assert!(job.typed_payload().unwrap().is_none());
    }

    #[test]
    fn test_typed_payload_garbage_is_error() {
        let job = Job {
            id: Uuid::new_v4(),
            kind: JobKind::Convert,
            status: JobStatus::Pending,
            priority: 0,
            payload: Some(serde_json::json!({"kind": "no_such_kind"})),
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            run_at: Utc::now(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        assert!(job.typed_payload().is_err());
    }

    #[test]
    fn test_kind_priorities_order() {
        assert!(JobKind::TrendDiscovery.default_priority() > JobKind::Convert.default_priority());
        assert!(JobKind::Convert.default_priority() > JobKind::Reconcile.default_priority());
    }
}
