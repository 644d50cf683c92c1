//! # trend-github
//!
//! GitHub-backed implementations of the trend and content source traits,
//! plus deterministic mocks for tests.

pub mod contents;
pub mod mock;
pub mod trend;

use std::time::Duration;

pub use contents::GithubContentSource;
pub use mock::{MockContentSource, MockTrendSource};
pub use trend::GithubTrendSource;

/// Default GitHub REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Outbound request timeout (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent on every request; GitHub rejects anonymous clients.
pub const USER_AGENT: &str = concat!("repotrend/", env!("CARGO_PKG_VERSION"));

/// Configuration shared by both GitHub clients.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    /// Optional token for higher rate limits.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl GithubConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `GITHUB_API_URL` | `https://api.github.com` | API endpoint |
    /// | `GITHUB_TOKEN` | unset | Auth token for higher rate limits |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Build a reqwest client with this config's headers and timeout.
    pub(crate) fn build_client(&self) -> reqwest::Client {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &self.token {
            if let Ok(value) =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .expect("Failed to create HTTP client")
    }
}
