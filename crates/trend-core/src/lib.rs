//! # trend-core
//!
//! Core types, traits, and abstractions for repotrend.
//!
//! This crate provides the domain models, the error type, the repository
//! and queue traits the storage layer implements, and the pure summary
//! renderer the conversion worker drives.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod summary;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use summary::{categorize_files, render_summary, truncate_excerpt, FileCategories};
pub use traits::*;

/// Create a time-ordered UUIDv7. Job and row ids sort chronologically,
/// which keeps claim ordering and log correlation sane.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
