//! GitHub trend source: repository search ranked by stars.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use trend_core::{Error, NewRepo, Result, TrendSource};

use crate::GithubConfig;

/// Trend source backed by the GitHub repository search API.
pub struct GithubTrendSource {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    name: String,
    full_name: String,
    description: Option<String>,
    stargazers_count: i64,
    html_url: String,
    language: Option<String>,
    owner: Option<SearchOwner>,
}

#[derive(Debug, Deserialize)]
struct SearchOwner {
    login: String,
    avatar_url: Option<String>,
}

impl GithubTrendSource {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            client: config.build_client(),
            api_url: config.api_url.clone(),
        }
    }

    fn map_item(item: SearchItem) -> Option<NewRepo> {
        // Search can return repos whose owner record is gone; those carry
        // no usable identity.
        let owner = item.owner?;
        Some(NewRepo {
            name: item.name,
            owner: owner.login,
            full_name: item.full_name,
            description: item.description,
            stars: item.stargazers_count,
            url: item.html_url,
            language: item.language,
            avatar_url: owner.avatar_url,
        })
    }
}

#[async_trait]
impl TrendSource for GithubTrendSource {
    #[instrument(skip(self), fields(subsystem = "github", op = "trending"))]
    async fn trending(
        &self,
        since: DateTime<Utc>,
        min_stars: i64,
        limit: u32,
    ) -> Result<Vec<NewRepo>> {
        let query = format!(
            "created:>{} stars:>={} sort:stars-desc",
            since.format("%Y-%m-%d"),
            min_stars
        );

        let per_page = limit.to_string();
        let response = self
            .client
            .get(format!("{}/search/repositories", self.api_url))
            .query(&[
                ("q", query.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Source(format!(
                "search returned {status} for query '{query}'"
            )));
        }

        let body: SearchResponse = response.json().await?;
        let candidates: Vec<NewRepo> = body.items.into_iter().filter_map(Self::map_item).collect();

        info!(
            subsystem = "github",
            op = "trending",
            result_count = candidates.len(),
            "Fetched trending repositories"
        );
        debug!(subsystem = "github", op = "trending", query = %query, "Search query");

        Ok(candidates)
    }
}
