//! End-to-end pipeline tests over in-memory fakes.
//!
//! These cover the discovery -> enqueue -> convert -> store flow without
//! Postgres: the fakes reproduce the store's transactional linkage
//! semantics (insert + enqueue + pending context in one step) and the
//! queue's retry rules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use trend_core::{
    defaults, ContextRepository, DiscoveryOutcome, EnqueueOptions, Error, Job, JobKind,
    JobPayload, JobQueue, JobStatus, NewRepo, QueueStats, RecurringSchedule, Repo, RepoContext,
    RepoRepository, RepositoryContents, Result, ScheduleRepository,
};
use trend_github::mock::{MockContentSource, MockTrendSource};
use trend_jobs::{
    trigger_discovery, ConvertHandler, JobContext, JobHandler, JobResult, ReconcileHandler,
    Scheduler, TrendDiscoveryHandler, WorkerBuilder, WorkerConfig, WorkerEvent,
};

// ============================================================================
// In-memory fakes
// ============================================================================

#[derive(Default)]
struct InMemoryQueue {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryQueue {
    fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    fn jobs_of_kind(&self, kind: JobKind) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: Option<JsonValue>,
        options: EnqueueOptions,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let job = Job {
            id: trend_core::new_v7(),
            kind,
            status: JobStatus::Pending,
            priority: options.priority.unwrap_or_else(|| kind.default_priority()),
            payload,
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            run_at: now + chrono::Duration::seconds(options.delay_secs.unwrap_or(0)),
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn enqueue_bulk(&self, kind: JobKind, payloads: Vec<JsonValue>) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(
                self.enqueue(kind, Some(payload), EnqueueOptions::default())
                    .await?,
            );
        }
        Ok(ids)
    }

    async fn claim_next_for_kinds(&self, kinds: &[JobKind]) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();

        let mut runnable: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending
                    && j.run_at <= now
                    && (kinds.is_empty() || kinds.contains(&j.kind))
            })
            .map(|(i, _)| i)
            .collect();
        runnable.sort_by(|&a, &b| {
            jobs[b]
                .priority
                .cmp(&jobs[a].priority)
                .then(jobs[a].run_at.cmp(&jobs[b].run_at))
                .then(jobs[a].created_at.cmp(&jobs[b].created_at))
        });

        match runnable.first() {
            Some(&i) => {
                jobs[i].status = JobStatus::Running;
                jobs[i].started_at = Some(now);
                Ok(Some(jobs[i].clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound("job not found".into()))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound("job not found".into()))?;
        job.error_message = Some(error.to_string());
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Pending;
            job.run_at = Utc::now()
                + chrono::Duration::seconds(
                    defaults::JOB_RETRY_BASE_SECS << job.retry_count.min(16),
                );
            job.started_at = None;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::NotFound("job not found".into()))?;
        job.status = JobStatus::Failed;
        job.error_message = Some(error.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.job(job_id))
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        Ok(QueueStats {
            pending: jobs.iter().filter(|j| j.status == JobStatus::Pending).count() as i64,
            running: jobs.iter().filter(|j| j.status == JobStatus::Running).count() as i64,
            completed_last_hour: jobs
                .iter()
                .filter(|j| j.status == JobStatus::Completed)
                .count() as i64,
            failed_last_hour: jobs.iter().filter(|j| j.status == JobStatus::Failed).count()
                as i64,
            total: jobs.len() as i64,
        })
    }
}

#[derive(Default)]
struct InMemoryContexts {
    rows: Mutex<Vec<RepoContext>>,
    queue: Mutex<Option<Arc<InMemoryQueue>>>,
}

impl InMemoryContexts {
    fn attach_queue(&self, queue: Arc<InMemoryQueue>) {
        *self.queue.lock().unwrap() = Some(queue);
    }

    fn push_row(&self, row: RepoContext) {
        self.rows.lock().unwrap().push(row);
    }

    fn rows(&self) -> Vec<RepoContext> {
        self.rows.lock().unwrap().clone()
    }

    fn pending_row(repo_id: Uuid, job_id: Uuid) -> RepoContext {
        RepoContext {
            id: Uuid::new_v4(),
            repo_id,
            format: defaults::CONTEXT_FORMAT.to_string(),
            branch: defaults::CONTEXT_BRANCH.to_string(),
            content: None,
            other: None,
            job_id: Some(job_id),
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[async_trait]
impl ContextRepository for InMemoryContexts {
    async fn complete_by_job(&self, job_id: Uuid, content: &str) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut touched = 0u64;
        for row in rows.iter_mut().filter(|r| r.job_id == Some(job_id)) {
            row.content = Some(content.to_string());
            row.updated_at = Some(Utc::now());
            touched += 1;
        }
        Ok(touched)
    }

    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<RepoContext>> {
        let queue = self.queue.lock().unwrap().clone();
        let rows = self.rows.lock().unwrap();
        let stale = rows
            .iter()
            .filter(|r| r.content.is_none() && r.created_at < older_than)
            .filter(|r| {
                // Only rows whose linked job can no longer deliver.
                let job_dead = match (&queue, r.job_id) {
                    (Some(q), Some(job_id)) => q
                        .job(job_id)
                        .map(|j| j.status == JobStatus::Failed)
                        .unwrap_or(true),
                    _ => true,
                };
                let superseded = rows
                    .iter()
                    .any(|other| other.repo_id == r.repo_id && other.created_at > r.created_at);
                job_dead && !superseded
            })
            .cloned()
            .collect();
        Ok(stale)
    }

    async fn list_for_repo(&self, repo_id: Uuid) -> Result<Vec<RepoContext>> {
        let mut rows: Vec<RepoContext> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.repo_id == repo_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

/// Mirrors the store's discovery transaction: insert new repos, enqueue a
/// conversion job per new repo, and link a pending context to each job id.
struct InMemoryRepos {
    repos: Mutex<Vec<Repo>>,
    queue: Arc<InMemoryQueue>,
    contexts: Arc<InMemoryContexts>,
    discovery_calls: AtomicUsize,
}

impl InMemoryRepos {
    fn new(queue: Arc<InMemoryQueue>, contexts: Arc<InMemoryContexts>) -> Self {
        Self {
            repos: Mutex::new(Vec::new()),
            queue,
            contexts,
            discovery_calls: AtomicUsize::new(0),
        }
    }

    fn seed(&self, candidate: &NewRepo) -> Repo {
        let repo = Repo {
            id: Uuid::new_v4(),
            name: candidate.name.clone(),
            owner: candidate.owner.clone(),
            full_name: candidate.full_name.clone(),
            description: candidate.description.clone(),
            stars: candidate.stars,
            url: candidate.url.clone(),
            language: candidate.language.clone(),
            avatar_url: candidate.avatar_url.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.repos.lock().unwrap().push(repo.clone());
        repo
    }

    fn count(&self) -> usize {
        self.repos.lock().unwrap().len()
    }
}

#[async_trait]
impl RepoRepository for InMemoryRepos {
    async fn record_trending(&self, candidates: Vec<NewRepo>) -> Result<DiscoveryOutcome> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let mut inserted = Vec::new();

        for candidate in candidates {
            let known = self.repos.lock().unwrap().iter().any(|r| {
                r.full_name == candidate.full_name && r.owner == candidate.owner
            });
            if known {
                continue;
            }
            inserted.push(self.seed(&candidate));
        }

        let mut job_ids = Vec::with_capacity(inserted.len());
        for repo in &inserted {
            let payload = JobPayload::Convert {
                repo_id: repo.id,
                repo: repo.metadata(),
                branch: defaults::CONTEXT_BRANCH.to_string(),
            };
            let job_id = self
                .queue
                .enqueue(
                    JobKind::Convert,
                    Some(serde_json::to_value(&payload)?),
                    EnqueueOptions::default(),
                )
                .await?;
            self.contexts
                .push_row(InMemoryContexts::pending_row(repo.id, job_id));
            job_ids.push(job_id);
        }

        Ok(DiscoveryOutcome { inserted, job_ids })
    }

    async fn reconvert(&self, repo_id: Uuid, branch: &str) -> Result<Uuid> {
        let repo = self
            .repos
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == repo_id)
            .cloned()
            .ok_or(Error::RepoNotFound(repo_id))?;

        // Link first: the job must never be claimable before its row exists.
        let job_id = trend_core::new_v7();
        let mut row = InMemoryContexts::pending_row(repo_id, job_id);
        row.branch = branch.to_string();
        self.contexts.push_row(row);

        let now = Utc::now();
        self.queue.jobs.lock().unwrap().push(Job {
            id: job_id,
            kind: JobKind::Convert,
            status: JobStatus::Pending,
            priority: JobKind::Convert.default_priority(),
            payload: Some(serde_json::to_value(JobPayload::Convert {
                repo_id,
                repo: repo.metadata(),
                branch: branch.to_string(),
            })?),
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            run_at: now,
            created_at: now,
            started_at: None,
            completed_at: None,
        });
        Ok(job_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Repo>> {
        Ok(self
            .repos
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list(&self, limit: i64) -> Result<Vec<Repo>> {
        let mut repos = self.repos.lock().unwrap().clone();
        repos.sort_by(|a, b| b.stars.cmp(&a.stars));
        repos.truncate(limit as usize);
        Ok(repos)
    }
}

#[derive(Default)]
struct InMemorySchedules {
    rows: Mutex<HashMap<String, RecurringSchedule>>,
}

#[async_trait]
impl ScheduleRepository for InMemorySchedules {
    async fn upsert(
        &self,
        id: &str,
        cron_expr: &str,
        kind: JobKind,
        payload: Option<JsonValue>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.rows.lock().unwrap().insert(
            id.to_string(),
            RecurringSchedule {
                id: id.to_string(),
                cron_expr: cron_expr.to_string(),
                kind,
                payload,
                next_run_at,
                last_run_at: None,
            },
        );
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<RecurringSchedule>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.next_run_at <= now)
            .cloned()
            .collect())
    }

    async fn mark_fired(&self, id: &str, next_run_at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| Error::NotFound("schedule not found".into()))?;
        row.last_run_at = Some(Utc::now());
        row.next_run_at = next_run_at;
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn candidate(name: &str, stars: i64, description: Option<&str>) -> NewRepo {
    NewRepo {
        name: name.to_string(),
        owner: "acme".to_string(),
        full_name: format!("acme/{name}"),
        description: description.map(String::from),
        stars,
        url: format!("https://github.com/acme/{name}"),
        language: Some("Rust".to_string()),
        avatar_url: None,
    }
}

fn sample_contents() -> RepositoryContents {
    RepositoryContents {
        readme: Some("A sample project readme.".to_string()),
        files: Vec::new(),
        languages: [("Rust".to_string(), 1000i64)].into_iter().collect(),
        topics: vec!["cli".to_string()],
        license: Some("MIT".to_string()),
    }
}

struct Pipeline {
    queue: Arc<InMemoryQueue>,
    contexts: Arc<InMemoryContexts>,
    repos: Arc<InMemoryRepos>,
}

fn pipeline() -> Pipeline {
    let queue = Arc::new(InMemoryQueue::default());
    let contexts = Arc::new(InMemoryContexts::default());
    contexts.attach_queue(queue.clone());
    let repos = Arc::new(InMemoryRepos::new(queue.clone(), contexts.clone()));
    Pipeline {
        queue,
        contexts,
        repos,
    }
}

fn running_job(kind: JobKind, payload: Option<JsonValue>) -> Job {
    Job {
        id: trend_core::new_v7(),
        kind,
        status: JobStatus::Running,
        priority: kind.default_priority(),
        payload,
        error_message: None,
        retry_count: 0,
        max_retries: defaults::JOB_MAX_RETRIES,
        run_at: Utc::now(),
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    }
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discovery_links_each_new_repo_to_its_job() {
    let p = pipeline();
    let source = Arc::new(MockTrendSource::new(vec![
        candidate("alpha", 900, Some("an async runtime")),
        candidate("beta", 300, Some("a text editor")),
        candidate("gamma", 700, None), // filtered: no description
    ]));

    let handler = TrendDiscoveryHandler::new(source, p.repos.clone());
    let result = handler
        .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
        .await;
    assert!(matches!(result, JobResult::Success));

    assert_eq!(p.repos.count(), 2);
    let convert_jobs = p.queue.jobs_of_kind(JobKind::Convert);
    assert_eq!(convert_jobs.len(), 2);

    // Every pending context row points at exactly the job whose payload
    // names its repo.
    for row in p.contexts.rows() {
        let job = p.queue.job(row.job_id.unwrap()).expect("linked job exists");
        match job.typed_payload().unwrap() {
            Some(JobPayload::Convert { repo_id, .. }) => assert_eq!(repo_id, row.repo_id),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_rediscovery_of_known_repo_adds_nothing() {
    let p = pipeline();
    let known = candidate("alpha", 900, Some("an async runtime"));
    p.repos.seed(&known);

    let source = Arc::new(MockTrendSource::new(vec![
        known.clone(),
        candidate("beta", 300, Some("a text editor")),
    ]));
    let handler = TrendDiscoveryHandler::new(source, p.repos.clone());
    let result = handler
        .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
        .await;
    assert!(matches!(result, JobResult::Success));

    // Only the unknown candidate produced a repo, a job, and a context.
    assert_eq!(p.repos.count(), 2);
    assert_eq!(p.queue.jobs_of_kind(JobKind::Convert).len(), 1);
    assert_eq!(p.contexts.rows().len(), 1);
}

#[tokio::test]
async fn test_discovery_retries_on_source_outage() {
    let p = pipeline();
    let source = Arc::new(MockTrendSource::new(vec![]));
    source.set_failing(true);

    let handler = TrendDiscoveryHandler::new(source, p.repos.clone());
    let result = handler
        .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
        .await;
    assert!(matches!(result, JobResult::Retry(_)));
    assert_eq!(p.repos.count(), 0);
}

// ============================================================================
// Conversion
// ============================================================================

#[tokio::test]
async fn test_conversion_fills_context_by_job_id() {
    let p = pipeline();
    let source = Arc::new(MockTrendSource::new(vec![candidate(
        "alpha",
        900,
        Some("an async runtime"),
    )]));
    TrendDiscoveryHandler::new(source, p.repos.clone())
        .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
        .await;

    let job = p
        .queue
        .claim_next_for_kinds(&[JobKind::Convert])
        .await
        .unwrap()
        .expect("a conversion job was enqueued");
    let job_id = job.id;

    let content = Arc::new(MockContentSource::new(sample_contents()));
    let handler = ConvertHandler::new(content, p.contexts.clone());
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Success));

    let rows = p.contexts.rows();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.job_id, Some(job_id));
    let content = row.content.as_deref().expect("content was written");
    assert!(content.contains("acme/alpha"));
    assert!(content.contains("an async runtime"));
    assert!(row.updated_at.is_some());
}

#[tokio::test]
async fn test_conversion_succeeds_on_partial_fetch() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));
    let payload = JobPayload::Convert {
        repo_id: repo.id,
        repo: repo.metadata(),
        branch: "main".to_string(),
    };
    let job = running_job(JobKind::Convert, Some(serde_json::to_value(&payload).unwrap()));
    p.contexts
        .push_row(InMemoryContexts::pending_row(repo.id, job.id));

    // README fetch came back empty; only the root listing survived.
    let degraded = RepositoryContents {
        readme: None,
        files: vec![trend_core::RepoFile {
            name: "main.rs".to_string(),
            path: "main.rs".to_string(),
            size: 100,
            kind: "file".to_string(),
            download_url: None,
        }],
        ..RepositoryContents::default()
    };

    let handler = ConvertHandler::new(
        Arc::new(MockContentSource::new(degraded)),
        p.contexts.clone(),
    );
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Success));

    let rows = p.contexts.rows();
    let content = rows[0].content.as_deref().unwrap();
    assert!(content.contains("## Project Structure"));
    assert!(content.contains("main.rs"));
    assert!(!content.contains("## README Content"));
}

#[tokio::test]
async fn test_conversion_retries_on_content_outage() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));
    let payload = JobPayload::Convert {
        repo_id: repo.id,
        repo: repo.metadata(),
        branch: "main".to_string(),
    };
    let job = running_job(JobKind::Convert, Some(serde_json::to_value(&payload).unwrap()));

    let content = Arc::new(MockContentSource::default());
    content.set_failing(true);
    let handler = ConvertHandler::new(content, p.contexts.clone());
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Retry(_)));
}

#[tokio::test]
async fn test_conversion_without_linked_context_fails_permanently() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));
    let payload = JobPayload::Convert {
        repo_id: repo.id,
        repo: repo.metadata(),
        branch: "main".to_string(),
    };
    // No context row was ever linked to this job id.
    let job = running_job(JobKind::Convert, Some(serde_json::to_value(&payload).unwrap()));

    let handler = ConvertHandler::new(
        Arc::new(MockContentSource::new(sample_contents())),
        p.contexts.clone(),
    );
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Failed(_)));
}

#[tokio::test]
async fn test_conversion_rejects_malformed_payload() {
    let p = pipeline();
    let job = running_job(
        JobKind::Convert,
        Some(serde_json::json!({"kind": "convert", "unexpected": true})),
    );
    let handler = ConvertHandler::new(
        Arc::new(MockContentSource::new(sample_contents())),
        p.contexts.clone(),
    );
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Failed(_)));
}

#[tokio::test]
async fn test_reconversion_job_is_linked_before_workers_see_it() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("an async runtime")));

    // Worker is already polling when the re-conversion lands.
    let worker = WorkerBuilder::new(p.queue.clone() as Arc<dyn JobQueue>)
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .with_handler(ConvertHandler::new(
            Arc::new(MockContentSource::new(sample_contents())),
            p.contexts.clone(),
        ))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let job_id = p.repos.reconvert(repo.id, "main").await.unwrap();

    // The job must complete, not die on the linkage-miss path.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted { job_id: id, .. }) if id == job_id => break,
                Ok(WorkerEvent::JobFailed { job_id: id, error, .. }) if id == job_id => {
                    panic!("re-conversion failed: {error}")
                }
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("re-conversion completed within the timeout");

    handle.shutdown().await.unwrap();

    assert_eq!(p.queue.job(job_id).unwrap().status, JobStatus::Completed);
    let row = p
        .contexts
        .rows()
        .into_iter()
        .find(|r| r.job_id == Some(job_id))
        .expect("a context row was linked to the new job");
    assert!(row.content.is_some());
}

// ============================================================================
// Retry semantics
// ============================================================================

#[tokio::test]
async fn test_fail_repends_until_retries_exhausted() {
    let queue = Arc::new(InMemoryQueue::default());
    let id = queue
        .enqueue(JobKind::Convert, None, EnqueueOptions::default())
        .await
        .unwrap();

    for attempt in 1..=defaults::JOB_MAX_RETRIES {
        queue.fail(id, "transient").await.unwrap();
        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, attempt);
        assert!(job.run_at > Utc::now());
    }

    queue.fail(id, "transient").await.unwrap();
    let job = queue.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_fail_permanent_bypasses_retries() {
    let queue = Arc::new(InMemoryQueue::default());
    let id = queue
        .enqueue(JobKind::Convert, None, EnqueueOptions::default())
        .await
        .unwrap();

    queue.fail_permanent(id, "structural").await.unwrap();
    let job = queue.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.error_message.as_deref(), Some("structural"));
}

// ============================================================================
// Manual trigger and scheduler
// ============================================================================

#[tokio::test]
async fn test_manual_trigger_claims_ahead_of_scheduled_work() {
    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryQueue::default());

    let scheduled = queue
        .enqueue(
            JobKind::TrendDiscovery,
            Some(serde_json::to_value(JobPayload::DiscoveryTrigger).unwrap()),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();
    let manual = trigger_discovery(&queue).await.unwrap();

    let manual_job = queue.get(manual).await.unwrap().unwrap();
    assert_eq!(manual_job.priority, defaults::MANUAL_TRIGGER_PRIORITY);

    let first = queue
        .claim_next_for_kinds(&[JobKind::TrendDiscovery])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, manual, "manual trigger outranks scheduled work");
    let second = queue
        .claim_next_for_kinds(&[JobKind::TrendDiscovery])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, scheduled);
}

#[tokio::test]
async fn test_concurrent_triggers_enqueue_but_never_duplicate_repos() {
    let p = pipeline();
    let queue = p.queue.clone() as Arc<dyn JobQueue>;

    let (a, b, c) = tokio::join!(
        trigger_discovery(&queue),
        trigger_discovery(&queue),
        trigger_discovery(&queue),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(p.queue.jobs_of_kind(JobKind::TrendDiscovery).len(), 3);

    // Every run sees the same candidate; only the first one inserts.
    for _ in 0..3 {
        let source = Arc::new(MockTrendSource::new(vec![candidate(
            "alpha",
            900,
            Some("an async runtime"),
        )]));
        TrendDiscoveryHandler::new(source, p.repos.clone())
            .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
            .await;
    }
    assert_eq!(p.repos.count(), 1);
    assert_eq!(p.queue.jobs_of_kind(JobKind::Convert).len(), 1);
}

#[tokio::test]
async fn test_scheduler_fires_due_rows_and_advances() {
    let queue = Arc::new(InMemoryQueue::default());
    let schedules = Arc::new(InMemorySchedules::default());
    let now = Utc::now();

    schedules
        .upsert(
            defaults::DISCOVERY_SCHEDULE_ID,
            defaults::DISCOVERY_CRON,
            JobKind::TrendDiscovery,
            Some(serde_json::to_value(JobPayload::DiscoveryTrigger).unwrap()),
            now - chrono::Duration::minutes(1),
        )
        .await
        .unwrap();

    let scheduler = Scheduler::new(schedules.clone(), queue.clone() as Arc<dyn JobQueue>);
    let fired = scheduler.fire_due(now).await.unwrap();
    assert_eq!(fired, 1);
    assert_eq!(queue.jobs_of_kind(JobKind::TrendDiscovery).len(), 1);

    // The row advanced past `now`, so a second tick is a no-op.
    let fired_again = scheduler.fire_due(now).await.unwrap();
    assert_eq!(fired_again, 0);
    assert_eq!(queue.jobs_of_kind(JobKind::TrendDiscovery).len(), 1);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_reconcile_reissues_orphaned_context() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));

    // A conversion job that failed permanently, leaving its context row
    // pending forever.
    let dead_job = p
        .queue
        .enqueue(JobKind::Convert, None, EnqueueOptions::default())
        .await
        .unwrap();
    p.queue.fail_permanent(dead_job, "linkage miss").await.unwrap();

    let mut orphan = InMemoryContexts::pending_row(repo.id, dead_job);
    orphan.created_at = Utc::now() - chrono::Duration::hours(2);
    let orphan_id = orphan.id;
    p.contexts.push_row(orphan);

    let handler = ReconcileHandler::new(p.contexts.clone(), p.repos.clone());
    let result = handler
        .execute(JobContext::new(running_job(JobKind::Reconcile, None)))
        .await;
    assert!(matches!(result, JobResult::Success));

    // A fresh pending job and a fresh context row linked to it; the
    // original row keeps its old job id.
    let rows = p.contexts.rows();
    assert_eq!(rows.len(), 2);
    let original = rows.iter().find(|r| r.id == orphan_id).unwrap();
    assert_eq!(original.job_id, Some(dead_job));
    let replacement = rows.iter().find(|r| r.id != orphan_id).unwrap();
    let new_job = p.queue.job(replacement.job_id.unwrap()).unwrap();
    assert_eq!(new_job.kind, JobKind::Convert);
    assert_eq!(new_job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_reconcile_skips_rows_with_live_jobs() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));

    let live_job = p
        .queue
        .enqueue(JobKind::Convert, None, EnqueueOptions::default())
        .await
        .unwrap();
    let mut row = InMemoryContexts::pending_row(repo.id, live_job);
    row.created_at = Utc::now() - chrono::Duration::hours(2);
    p.contexts.push_row(row);

    let handler = ReconcileHandler::new(p.contexts.clone(), p.repos.clone());
    let result = handler
        .execute(JobContext::new(running_job(JobKind::Reconcile, None)))
        .await;
    assert!(matches!(result, JobResult::Success));

    // The linked job is still pending, so nothing was reissued.
    assert_eq!(p.contexts.rows().len(), 1);
    assert_eq!(p.queue.jobs_of_kind(JobKind::Convert).len(), 1);
}

// ============================================================================
// Worker loop
// ============================================================================

/// Discovery handler that holds its slot long enough for other jobs to
/// land and finish around it.
struct SlowDiscoveryHandler;

#[async_trait]
impl JobHandler for SlowDiscoveryHandler {
    fn kind(&self) -> JobKind {
        JobKind::TrendDiscovery
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        tokio::time::sleep(Duration::from_millis(400)).await;
        JobResult::Success
    }
}

#[tokio::test]
async fn test_fast_job_completes_while_slow_job_runs() {
    let p = pipeline();
    let repo = p.repos.seed(&candidate("alpha", 900, Some("desc")));

    let slow_id = p
        .queue
        .enqueue(JobKind::TrendDiscovery, None, EnqueueOptions::default())
        .await
        .unwrap();

    let worker = WorkerBuilder::new(p.queue.clone() as Arc<dyn JobQueue>)
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .with_handler(SlowDiscoveryHandler)
        .with_handler(ConvertHandler::new(
            Arc::new(MockContentSource::new(sample_contents())),
            p.contexts.clone(),
        ))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    // Enqueue the conversion only after the slow job occupies its slot.
    let convert_id = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobStarted { job_id, .. }) if job_id == slow_id => {
                    break p.repos.reconvert(repo.id, "main").await.unwrap();
                }
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("slow job started within the timeout");

    // The conversion must not wait for the slow slot-mate to finish.
    let first_done = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted { job_id, .. }) => break job_id,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("a job completed within the timeout");
    assert_eq!(first_done, convert_id, "fast job finished behind the slow one");

    // The slow job still runs to completion afterwards.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted { job_id, .. }) if job_id == slow_id => break,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("slow job completed within the timeout");

    handle.shutdown().await.unwrap();
    assert_eq!(p.queue.job(slow_id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_disabled_worker_processes_nothing() {
    let p = pipeline();
    let job_id = p
        .queue
        .enqueue(JobKind::Convert, None, EnqueueOptions::default())
        .await
        .unwrap();

    let worker = WorkerBuilder::new(p.queue.clone() as Arc<dyn JobQueue>)
        .with_config(
            WorkerConfig::default()
                .with_poll_interval(10)
                .with_enabled(false),
        )
        .with_handler(ConvertHandler::new(
            Arc::new(MockContentSource::new(sample_contents())),
            p.contexts.clone(),
        ))
        .build()
        .await;
    let handle = worker.start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(p.queue.job(job_id).unwrap().status, JobStatus::Pending);

    // The disabled loop exited on its own; shutdown has nobody to signal.
    assert!(handle.shutdown().await.is_err());
}

#[tokio::test]
async fn test_worker_processes_conversion_end_to_end() {
    let p = pipeline();
    let source = Arc::new(MockTrendSource::new(vec![candidate(
        "alpha",
        900,
        Some("an async runtime"),
    )]));
    TrendDiscoveryHandler::new(source, p.repos.clone())
        .execute(JobContext::new(running_job(JobKind::TrendDiscovery, None)))
        .await;

    let worker = WorkerBuilder::new(p.queue.clone() as Arc<dyn JobQueue>)
        .with_config(WorkerConfig::default().with_poll_interval(10))
        .with_handler(ConvertHandler::new(
            Arc::new(MockContentSource::new(sample_contents())),
            p.contexts.clone(),
        ))
        .build()
        .await;

    let handle = worker.start();
    let mut events = handle.events();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::JobCompleted { job_id, .. }) => break job_id,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("conversion completed within the timeout");

    handle.shutdown().await.unwrap();

    let job = p.queue.job(completed).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let rows = p.contexts.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].content.is_some());
}
