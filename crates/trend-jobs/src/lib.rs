//! # trend-jobs
//!
//! Background job processing for repotrend.
//!
//! This crate provides:
//! - A concurrent polling worker over the durable job queue
//! - The trend discovery, context conversion, and reconciliation handlers
//! - A recurring-schedule producer (cron expressions, durable rows)
//! - Worker events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trend_jobs::{ConvertHandler, TrendDiscoveryHandler, WorkerBuilder, WorkerConfig};
//! use trend_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! let worker = WorkerBuilder::new(db.jobs.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(TrendDiscoveryHandler::new(source, repos))
//!     .with_handler(ConvertHandler::new(content, contexts))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod convert;
pub mod discovery;
pub mod handler;
pub mod reconcile;
pub mod scheduler;
pub mod worker;

// Re-export core types
pub use trend_core::*;

pub use convert::ConvertHandler;
pub use discovery::TrendDiscoveryHandler;
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use reconcile::ReconcileHandler;
pub use scheduler::{
    install_default_schedules, next_occurrence, trigger_discovery, Scheduler, SchedulerHandle,
};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
