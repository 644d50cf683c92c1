//! GitHub content source: repo metadata, languages, root listing, README.
//!
//! The three API sub-fetches run concurrently and fail independently; a
//! failed one leaves its field empty so the conversion job still produces
//! a partial-but-valid summary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use trend_core::{ContentSource, RepoFile, RepositoryContents, Result};

use crate::GithubConfig;

/// Content source backed by the GitHub REST API.
pub struct GithubContentSource {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    topics: Vec<String>,
    license: Option<LicenseInfo>,
}

#[derive(Debug, Deserialize)]
struct LicenseInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(default)]
    size: i64,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

impl GithubContentSource {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            client: config.build_client(),
            api_url: config.api_url.clone(),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(trend_core::Error::Source(format!(
                "{url} returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn fetch_info(&self, owner: &str, name: &str) -> Result<RepoInfo> {
        self.fetch_json(format!("{}/repos/{}/{}", self.api_url, owner, name))
            .await
    }

    async fn fetch_languages(&self, owner: &str, name: &str) -> Result<BTreeMap<String, i64>> {
        self.fetch_json(format!("{}/repos/{}/{}/languages", self.api_url, owner, name))
            .await
    }

    async fn fetch_listing(&self, owner: &str, name: &str, branch: &str) -> Result<Vec<ContentEntry>> {
        self.fetch_json(format!(
            "{}/repos/{}/{}/contents/?ref={}",
            self.api_url, owner, name, branch
        ))
        .await
    }

    /// Fetch the README body via its raw download URL, if the listing had
    /// one. Any failure degrades to None.
    async fn fetch_readme(&self, files: &[RepoFile]) -> Option<String> {
        let readme = files
            .iter()
            .find(|f| f.is_file() && f.name.to_lowercase().starts_with("readme"))?;
        let url = readme.download_url.as_ref()?;

        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                warn!(
                    subsystem = "github",
                    op = "readme",
                    status = %resp.status(),
                    "README fetch degraded"
                );
                None
            }
            Err(e) => {
                warn!(subsystem = "github", op = "readme", error = %e, "README fetch degraded");
                None
            }
        }
    }
}

#[async_trait]
impl ContentSource for GithubContentSource {
    #[instrument(skip(self), fields(subsystem = "github", op = "contents"))]
    async fn contents(
        &self,
        owner: &str,
        name: &str,
        branch: &str,
    ) -> Result<RepositoryContents> {
        let (info, languages, listing) = tokio::join!(
            self.fetch_info(owner, name),
            self.fetch_languages(owner, name),
            self.fetch_listing(owner, name, branch),
        );

        let mut result = RepositoryContents::default();
        let mut failures = 0usize;

        match info {
            Ok(info) => {
                result.topics = info.topics;
                result.license = info.license.map(|l| l.name);
            }
            Err(e) => {
                failures += 1;
                warn!(subsystem = "github", op = "contents", error = %e, "repo info degraded");
            }
        }

        match languages {
            Ok(languages) => result.languages = languages,
            Err(e) => {
                failures += 1;
                warn!(subsystem = "github", op = "contents", error = %e, "languages degraded");
            }
        }

        match listing {
            Ok(entries) => {
                result.files = entries
                    .into_iter()
                    .map(|e| RepoFile {
                        name: e.name,
                        path: e.path,
                        size: e.size,
                        kind: e.kind,
                        download_url: e.download_url,
                    })
                    .collect();
            }
            Err(e) => {
                failures += 1;
                warn!(subsystem = "github", op = "contents", error = %e, "listing degraded");
            }
        }

        // All three gone means the source itself is unreachable; let the
        // queue's retry policy handle it.
        if failures == 3 {
            return Err(trend_core::Error::Source(format!(
                "all content sub-fetches failed for {owner}/{name}"
            )));
        }

        result.readme = self.fetch_readme(&result.files).await;

        debug!(
            subsystem = "github",
            op = "contents",
            repo = format!("{owner}/{name}"),
            files = result.files.len(),
            degraded = failures,
            readme = result.readme.is_some(),
            "Fetched repository contents"
        );

        Ok(result)
    }
}
