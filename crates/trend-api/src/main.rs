//! trend-api - HTTP API server and worker host for repotrend
//!
//! Binds the whole system together: connects to Postgres, runs migrations,
//! starts the job worker with the discovery/conversion/reconciliation
//! handlers, installs the recurring schedules, and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use trend_core::{defaults, ContextRepository, JobQueue, RepoRepository, ScheduleRepository};
use trend_db::{Database, PgContextRepository, PgRepoRepository, PgScheduleRepository};
use trend_github::{GithubConfig, GithubContentSource, GithubTrendSource};
use trend_jobs::{
    install_default_schedules, trigger_discovery, ConvertHandler, ReconcileHandler, Scheduler,
    TrendDiscoveryHandler, WorkerBuilder, WorkerConfig,
};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = trend_core::new_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
struct AppState {
    repos: Arc<dyn RepoRepository>,
    contexts: Arc<dyn ContextRepository>,
    queue: Arc<dyn JobQueue>,
}

// =============================================================================
// ERRORS
// =============================================================================

enum ApiError {
    Internal(trend_core::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<trend_core::Error> for ApiError {
    fn from(err: trend_core::Error) -> Self {
        match &err {
            trend_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            trend_core::Error::RepoNotFound(id) => {
                ApiError::NotFound(format!("Repository not found: {id}"))
            }
            trend_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// REPO HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListReposQuery {
    limit: Option<i64>,
}

/// Clamp a caller-supplied page size to something sane.
fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(defaults::PAGE_LIMIT).clamp(1, 100)
}

async fn list_repos(
    State(state): State<AppState>,
    Query(query): Query<ListReposQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repos = state.repos.list(clamp_limit(query.limit)).await?;
    let count = repos.len();
    Ok(Json(serde_json::json!({
        "repos": repos,
        "count": count,
    })))
}

async fn get_repo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state
        .repos
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Repository not found: {id}")))?;
    let contexts = state.contexts.list_for_repo(id).await?;
    Ok(Json(serde_json::json!({
        "repo": repo,
        "contexts": contexts,
    })))
}

/// Manually kick off a discovery run, ahead of scheduled work.
async fn trigger_import(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let job_id = trigger_discovery(&state.queue).await?;
    info!(?job_id, "Manual discovery triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Trend import job queued",
            "job_id": job_id,
        })),
    ))
}

/// Re-run conversion for an existing repository. The fresh job and its
/// pending context row commit together, so the job is never claimable
/// before the row exists; existing context rows are untouched.
async fn reconvert_repo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = state.repos.reconvert(id, defaults::CONTEXT_BRANCH).await?;

    info!(repo_id = ?id, ?job_id, "Reconversion queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Reconversion job queued",
            "job_id": job_id,
        })),
    ))
}

// =============================================================================
// JOB HANDLERS
// =============================================================================

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .queue
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
    Ok(Json(job))
}

async fn pending_jobs_count(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let count = state.queue.pending_count().await?;
    Ok(Json(serde_json::json!({ "pending": count })))
}

async fn queue_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

// =============================================================================
// ROUTER
// =============================================================================

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Repositories
        .route("/api/v1/repos", get(list_repos))
        .route("/api/v1/repos/list", get(list_repos))
        .route("/api/v1/repos/trigger-import", post(trigger_import))
        .route("/api/v1/repos/:id", get(get_repo))
        .route("/api/v1/repos/:id/reconvert", post(reconvert_repo))
        // Jobs
        .route("/api/v1/jobs/pending", get(pending_jobs_count))
        .route("/api/v1/jobs/stats", get(queue_stats))
        .route("/api/v1/jobs/:id", get(get_job))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT - "json" or "text" (default: "text")
    //   RUST_LOG   - standard env filter (default: "trend_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trend_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    info!(log_format = %log_format, "Logging initialized");

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/repotrend".to_string());
    let bind_addr =
        std::env::var("BIND_ADDR").unwrap_or_else(|_| defaults::API_BIND_ADDR.to_string());

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Shared trait objects over the one pool
    let repos: Arc<dyn RepoRepository> = Arc::new(PgRepoRepository::new(
        db.pool.clone(),
        db.jobs.job_notify(),
    ));
    let contexts: Arc<dyn ContextRepository> =
        Arc::new(PgContextRepository::new(db.pool.clone()));
    let schedules: Arc<dyn ScheduleRepository> =
        Arc::new(PgScheduleRepository::new(db.pool.clone()));
    let queue: Arc<dyn JobQueue> = db.jobs.clone();

    // GitHub sources
    let github = GithubConfig::from_env();
    let trend_source = Arc::new(GithubTrendSource::new(&github));
    let content_source = Arc::new(GithubContentSource::new(&github));

    // Create and start job worker; JOB_WORKER_ENABLED=false turns it off
    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        info!("Starting job worker...");
        let worker = WorkerBuilder::new(queue.clone())
            .with_config(worker_config)
            .with_handler(TrendDiscoveryHandler::new(trend_source, repos.clone()))
            .with_handler(ConvertHandler::new(content_source, contexts.clone()))
            .with_handler(ReconcileHandler::new(contexts.clone(), repos.clone()))
            .build()
            .await;
        let handle = worker.start();
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    // Install recurring schedules and start the scheduler
    install_default_schedules(&schedules).await?;
    let scheduler_handle = Scheduler::new(schedules, queue.clone()).start();
    info!("Scheduler started");

    // Create app state and router
    let state = AppState {
        repos,
        contexts,
        queue,
    };
    let app = app(state);

    // Start server
    let addr: SocketAddr = bind_addr.parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain background tasks before exit
    scheduler_handle.shutdown().await?;
    if let Some(handle) = worker_handle {
        handle.shutdown().await?;
    }
    info!("Server stopped");

    Ok(())
}
