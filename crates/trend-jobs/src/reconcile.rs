//! Reconciliation sweep job handler.
//!
//! Pending context rows whose conversion job failed permanently (or
//! vanished) would otherwise stay pending forever. The sweep finds them
//! and issues a replacement: a fresh conversion job plus a fresh pending
//! row linked to the new job id. The original row and its job id are left
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use trend_core::{defaults, ContextRepository, JobKind, RepoRepository};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Handler for [`JobKind::Reconcile`] jobs.
pub struct ReconcileHandler {
    contexts: Arc<dyn ContextRepository>,
    repos: Arc<dyn RepoRepository>,
}

impl ReconcileHandler {
    pub fn new(contexts: Arc<dyn ContextRepository>, repos: Arc<dyn RepoRepository>) -> Self {
        Self { contexts, repos }
    }
}

#[async_trait]
impl JobHandler for ReconcileHandler {
    fn kind(&self) -> JobKind {
        JobKind::Reconcile
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let job_id = ctx.job_id();
        let older_than = Utc::now() - Duration::minutes(defaults::RECONCILE_STALE_MINUTES);

        let stale = match self.contexts.stale_pending(older_than).await {
            Ok(stale) => stale,
            Err(e) if e.is_retryable() => {
                return JobResult::Retry(format!("Failed to list stale contexts: {e}"))
            }
            Err(e) => return JobResult::Failed(format!("Failed to list stale contexts: {e}")),
        };

        if stale.is_empty() {
            info!(?job_id, "Reconciliation sweep found nothing stale");
            return JobResult::Success;
        }

        let mut reissued = 0usize;
        let mut skipped = 0usize;

        for row in &stale {
            // The replacement job and its pending row commit together, so
            // the new job is never claimable before the row exists.
            match self.repos.reconvert(row.repo_id, &row.branch).await {
                Ok(new_job_id) => {
                    info!(
                        ?job_id,
                        repo_id = ?row.repo_id,
                        stale_context = ?row.id,
                        new_job = ?new_job_id,
                        "Reissued conversion for orphaned context"
                    );
                    reissued += 1;
                }
                Err(e) => {
                    // One bad row must not sink the whole sweep; the next
                    // run will pick it up again.
                    warn!(
                        ?job_id,
                        repo_id = ?row.repo_id,
                        error = %e,
                        "Failed to reissue conversion, skipping"
                    );
                    skipped += 1;
                }
            }
        }

        info!(?job_id, reissued, skipped, "Reconciliation sweep finished");
        JobResult::Success
    }
}
