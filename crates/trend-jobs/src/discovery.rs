//! Trend discovery job handler.
//!
//! Queries the trend source for repositories created inside the trailing
//! window, filters the candidates, and hands them to the store as one
//! atomic discovery run. The store inserts new repos, enqueues a
//! conversion job for each, and links each new repo's pending context to
//! its job id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use trend_core::{defaults, JobKind, NewRepo, RepoRepository, TrendSource};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Handler for [`JobKind::TrendDiscovery`] jobs.
pub struct TrendDiscoveryHandler {
    source: Arc<dyn TrendSource>,
    repos: Arc<dyn RepoRepository>,
}

impl TrendDiscoveryHandler {
    pub fn new(source: Arc<dyn TrendSource>, repos: Arc<dyn RepoRepository>) -> Self {
        Self { source, repos }
    }
}

/// Drop candidates with no description or too few stars. The source
/// already sorts by stars; filtering never reorders.
pub fn filter_candidates(candidates: Vec<NewRepo>, min_stars: i64) -> Vec<NewRepo> {
    candidates
        .into_iter()
        .filter(|c| {
            c.description
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty())
                && c.stars >= min_stars
        })
        .collect()
}

#[async_trait]
impl JobHandler for TrendDiscoveryHandler {
    fn kind(&self) -> JobKind {
        JobKind::TrendDiscovery
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let job_id = ctx.job_id();
        let since = Utc::now() - Duration::days(defaults::TREND_WINDOW_DAYS);

        let candidates = match self
            .source
            .trending(since, defaults::TREND_MIN_STARS, defaults::TREND_PAGE_SIZE)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) if e.is_retryable() => {
                warn!(?job_id, error = %e, "Trend source unavailable");
                return JobResult::Retry(format!("Trend source unavailable: {e}"));
            }
            Err(e) => return JobResult::Failed(format!("Trend query failed: {e}")),
        };

        let fetched = candidates.len();
        let candidates = filter_candidates(candidates, defaults::TREND_MIN_STARS);
        info!(
            ?job_id,
            fetched,
            kept = candidates.len(),
            "Discovery fetched trending candidates"
        );

        match self.repos.record_trending(candidates).await {
            Ok(outcome) => {
                info!(
                    ?job_id,
                    inserted = outcome.inserted.len(),
                    enqueued = outcome.job_ids.len(),
                    "Discovery run recorded"
                );
                JobResult::Success
            }
            Err(e) if e.is_retryable() => {
                JobResult::Retry(format!("Failed to record discovery run: {e}"))
            }
            Err(e) => JobResult::Failed(format!("Failed to record discovery run: {e}")),
        }
    }
}
