//! Context conversion job handler.
//!
//! Fetches a repository's raw contents, renders the deterministic text
//! summary, and writes it into the context row linked to this job's id.
//! The job id is the only correlation key: the handler never searches for
//! a context row by repo.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use trend_core::{render_summary, ContentSource, ContextRepository, JobKind, JobPayload};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Handler for [`JobKind::Convert`] jobs.
pub struct ConvertHandler {
    content: Arc<dyn ContentSource>,
    contexts: Arc<dyn ContextRepository>,
}

impl ConvertHandler {
    pub fn new(content: Arc<dyn ContentSource>, contexts: Arc<dyn ContextRepository>) -> Self {
        Self { content, contexts }
    }
}

#[async_trait]
impl JobHandler for ConvertHandler {
    fn kind(&self) -> JobKind {
        JobKind::Convert
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let job_id = ctx.job_id();

        let (repo, branch) = match ctx.typed_payload() {
            Ok(Some(JobPayload::Convert { repo, branch, .. })) => (repo, branch),
            Ok(_) => return JobResult::Failed("Missing or mismatched convert payload".into()),
            Err(e) => return JobResult::Failed(format!("Malformed convert payload: {e}")),
        };

        info!(?job_id, repo = %repo.full_name, "Converting repository context");

        let contents = match self.content.contents(&repo.owner, &repo.name, &branch).await {
            Ok(contents) => contents,
            Err(e) if e.is_retryable() => {
                warn!(?job_id, repo = %repo.full_name, error = %e, "Content fetch failed");
                return JobResult::Retry(format!("Content fetch failed: {e}"));
            }
            Err(e) => return JobResult::Failed(format!("Content fetch failed: {e}")),
        };

        let summary = render_summary(&repo, &contents);

        match self.contexts.complete_by_job(job_id, &summary).await {
            Ok(0) => {
                // No context row carries this job id. Retrying reproduces
                // the same miss, so fail permanently and let the
                // reconciliation sweep issue a replacement.
                warn!(?job_id, repo = %repo.full_name, "No context row linked to this job");
                JobResult::Failed(format!("No context row linked to job {job_id}"))
            }
            Ok(rows) => {
                info!(
                    ?job_id,
                    repo = %repo.full_name,
                    rows,
                    summary_len = summary.len(),
                    "Context conversion complete"
                );
                JobResult::Success
            }
            Err(e) if e.is_retryable() => {
                JobResult::Retry(format!("Failed to store context: {e}"))
            }
            Err(e) => JobResult::Failed(format!("Failed to store context: {e}")),
        }
    }
}
