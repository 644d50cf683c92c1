//! Job handler trait and execution context.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use trend_core::{Job, JobKind, JobPayload};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The job's id — the correlation key conversion results are written
    /// under.
    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Get the raw job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }

    /// Decode the typed payload; a malformed payload is a structural
    /// failure the caller should treat as permanent.
    pub fn typed_payload(&self) -> trend_core::Result<Option<JobPayload>> {
        self.job.typed_payload()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully.
    Success,
    /// Structural failure; retrying cannot succeed. Fails the job
    /// permanently.
    Failed(String),
    /// Transient failure; goes through the bounded retry/backoff path.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Execute the job. Handlers must be idempotent: at-least-once
    /// delivery means a crashed worker re-runs the same job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// No-op handler for testing.
pub struct NoOpHandler {
    kind: JobKind,
}

impl NoOpHandler {
    pub fn new(kind: JobKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success
    }
}
