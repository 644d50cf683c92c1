//! Structured logging field name constants for repotrend.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

/// Subsystem originating the log event.
/// Values: "api", "db", "jobs", "scheduler", "github"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "worker", "discovery", "convert"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "record_trending", "claim_next", "trending", "contents"
pub const OPERATION: &str = "op";

/// Repository UUID being operated on.
pub const REPO_ID: &str = "repo_id";

/// Repository full name ("owner/name").
pub const REPO_FULL_NAME: &str = "repo";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job kind enum variant.
pub const JOB_KIND: &str = "job_kind";

/// Recurring schedule identifier.
pub const SCHEDULE_ID: &str = "schedule_id";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of candidates/rows returned by an operation.
pub const RESULT_COUNT: &str = "result_count";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
