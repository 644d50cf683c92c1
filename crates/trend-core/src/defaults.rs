//! Centralized default constants for the repotrend system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers.

// =============================================================================
// TREND DISCOVERY
// =============================================================================

/// Trailing window (days) for the "recently created" discovery filter.
pub const TREND_WINDOW_DAYS: i64 = 7;

/// Number of ranked candidates fetched per discovery run.
pub const TREND_PAGE_SIZE: u32 = 10;

/// Minimum star count a candidate needs to enter the store.
pub const TREND_MIN_STARS: i64 = 50;

/// Context row defaults written alongside newly discovered repositories.
pub const CONTEXT_FORMAT: &str = "text/llm-readable";
pub const CONTEXT_BRANCH: &str = "main";

// =============================================================================
// SUMMARY RENDERING
// =============================================================================

/// Hard cap (chars) on the README excerpt embedded in a summary.
pub const README_EXCERPT_MAX: usize = 2000;

/// Marker appended when the README excerpt hits the cap.
pub const README_TRUNCATION_MARKER: &str = "\n\n[README truncated...]";

/// Maximum source files listed in the project-structure section.
pub const SOURCE_FILE_LIST_CAP: usize = 10;

/// Maximum uncategorized files listed in the project-structure section.
pub const OTHER_FILE_LIST_CAP: usize = 5;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Maximum retries before a job is permanently failed.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Base delay (seconds) for exponential retry backoff: base * 2^retry_count.
pub const JOB_RETRY_BASE_SECS: i64 = 30;

/// Per-job execution timeout (seconds). Exceeding it sends the job down
/// the retry path and releases the worker slot.
pub const JOB_TIMEOUT_SECS: u64 = 120;

/// Maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Polling interval (ms) when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Priority for manually triggered discovery runs. Above every kind's
/// default priority, so manual triggers jump the line.
pub const MANUAL_TRIGGER_PRIORITY: i32 = 10;

/// Broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Cron expression (sec min hour dom month dow) for the daily discovery run.
pub const DISCOVERY_CRON: &str = "0 0 0 * * *";

/// Cron expression for the reconciliation sweep (hourly, offset from the
/// discovery run).
pub const RECONCILE_CRON: &str = "0 30 * * * *";

/// Schedule identifiers. `upsert` on these ids keeps installs idempotent.
pub const DISCOVERY_SCHEDULE_ID: &str = "trend-discovery-daily";
pub const RECONCILE_SCHEDULE_ID: &str = "context-reconcile-hourly";

/// How often (seconds) the scheduler loop scans for due schedules.
pub const SCHEDULER_TICK_SECS: u64 = 30;

/// A pending context older than this (minutes) with a dead job is eligible
/// for the reconciliation sweep.
pub const RECONCILE_STALE_MINUTES: i64 = 60;

// =============================================================================
// SERVER
// =============================================================================

/// Default API bind address.
pub const API_BIND_ADDR: &str = "0.0.0.0:3400";

/// Default page size for repo list endpoints.
pub const PAGE_LIMIT: i64 = 10;
