//! Mock trend/content sources for deterministic testing.
//!
//! The mocks return canned data, record calls, and can be told to fail,
//! covering the retry and degradation paths without the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use trend_core::{ContentSource, Error, NewRepo, RepositoryContents, Result, TrendSource};

/// Mock trend source serving a fixed candidate list.
#[derive(Clone, Default)]
pub struct MockTrendSource {
    candidates: Arc<Mutex<Vec<NewRepo>>>,
    calls: Arc<AtomicUsize>,
    fail: Arc<Mutex<bool>>,
}

impl MockTrendSource {
    pub fn new(candidates: Vec<NewRepo>) -> Self {
        Self {
            candidates: Arc::new(Mutex::new(candidates)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Make subsequent calls fail with a source error.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }

    /// Replace the served candidates.
    pub fn set_candidates(&self, candidates: Vec<NewRepo>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendSource for MockTrendSource {
    async fn trending(
        &self,
        _since: DateTime<Utc>,
        min_stars: i64,
        limit: u32,
    ) -> Result<Vec<NewRepo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(Error::Source("mock trend source down".into()));
        }
        let mut items: Vec<NewRepo> = self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.stars >= min_stars)
            .cloned()
            .collect();
        items.truncate(limit as usize);
        Ok(items)
    }
}

/// Mock content source serving one canned `RepositoryContents`.
#[derive(Clone)]
pub struct MockContentSource {
    contents: Arc<Mutex<RepositoryContents>>,
    calls: Arc<AtomicUsize>,
    fail: Arc<Mutex<bool>>,
}

impl MockContentSource {
    pub fn new(contents: RepositoryContents) -> Self {
        Self {
            contents: Arc::new(Mutex::new(contents)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockContentSource {
    fn default() -> Self {
        Self::new(RepositoryContents::default())
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    async fn contents(
        &self,
        _owner: &str,
        _name: &str,
        _branch: &str,
    ) -> Result<RepositoryContents> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(Error::Source("mock content source down".into()));
        }
        Ok(self.contents.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, stars: i64) -> NewRepo {
        NewRepo {
            name: name.into(),
            owner: "acme".into(),
            full_name: format!("acme/{name}"),
            description: Some("x".into()),
            stars,
            url: format!("https://github.com/acme/{name}"),
            language: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_mock_trend_filters_and_counts() {
        let source = MockTrendSource::new(vec![candidate("a", 10), candidate("b", 500)]);
        let got = source.trending(Utc::now(), 100, 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "b");
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_trend_failure_mode() {
        let source = MockTrendSource::new(vec![candidate("a", 500)]);
        source.set_failing(true);
        assert!(source.trending(Utc::now(), 0, 10).await.is_err());
        source.set_failing(false);
        assert!(source.trending(Utc::now(), 0, 10).await.is_ok());
    }
}
