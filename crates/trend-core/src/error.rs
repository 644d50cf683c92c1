//! Error types for repotrend.

use thiserror::Error;

/// Result type alias using repotrend's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for repotrend operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Repository not found
    #[error("Repository not found: {0}")]
    RepoNotFound(uuid::Uuid),

    /// Trend or content source unreachable, rate-limited, or returned garbage
    #[error("Source error: {0}")]
    Source(String),

    /// A job's correlation id has no matching context row. Terminal:
    /// retrying under the same id cannot succeed.
    #[error("Linkage miss: no context row for job {0}")]
    Linkage(uuid::Uuid),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Source(e.to_string())
    }
}

impl Error {
    /// Whether a failed job carrying this error should be retried.
    ///
    /// Source failures are transient (network, rate limits); linkage misses
    /// and bad input are structural and cannot be fixed by reprocessing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Source(_) | Error::Database(_))
    }
}
