//! # trend-db
//!
//! PostgreSQL database layer for repotrend.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository and context persistence, including the atomic
//!   insert + enqueue + link discovery transaction
//! - The durable job queue (`FOR UPDATE SKIP LOCKED` claiming, bounded
//!   retries with backoff)
//! - Recurring cron schedule storage
//!
//! ## Example
//!
//! ```rust,ignore
//! use trend_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/repotrend").await?;
//!     let outcome = db.repos.record_trending(candidates).await?;
//!     println!("inserted {} new repos", outcome.inserted.len());
//!     Ok(())
//! }
//! ```

pub mod contexts;
pub mod jobs;
pub mod pool;
pub mod repos;
pub mod schedules;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use trend_core::*;

pub use contexts::PgContextRepository;
pub use jobs::{retry_backoff, PgJobQueue};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use repos::PgRepoRepository;
pub use schedules::PgScheduleRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Repository persistence + the discovery transaction.
    pub repos: PgRepoRepository,
    /// Context (enrichment record) persistence.
    pub contexts: PgContextRepository,
    /// Durable job queue.
    pub jobs: Arc<PgJobQueue>,
    /// Recurring schedules.
    pub schedules: PgScheduleRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        let jobs = Arc::new(PgJobQueue::new(pool.clone()));
        Self {
            repos: PgRepoRepository::new(pool.clone(), jobs.job_notify()),
            contexts: PgContextRepository::new(pool.clone()),
            schedules: PgScheduleRepository::new(pool.clone()),
            jobs,
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            repos: PgRepoRepository::new(self.pool.clone(), self.jobs.job_notify()),
            contexts: PgContextRepository::new(self.pool.clone()),
            schedules: PgScheduleRepository::new(self.pool.clone()),
            jobs: self.jobs.clone(),
        }
    }
}
