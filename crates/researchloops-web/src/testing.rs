//! In-memory web collaborators for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::{FetchedPage, PageFetch, WebError, WebSearch};

/// Search returning canned URLs per keyword (or a default list)
#[derive(Default)]
pub struct StaticSearch {
    results: HashMap<String, Vec<String>>,
    default_results: Vec<String>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(default_results: Vec<String>) -> Self {
        Self {
            default_results,
            ..Default::default()
        }
    }

    pub fn with_results(mut self, keyword: &str, urls: Vec<String>) -> Self {
        self.results.insert(keyword.to_string(), urls);
        self
    }

    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }

    /// Queries received so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<String>, WebError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(keyword.to_string());
        if self.failing.contains(keyword) {
            return Err(WebError::Search {
                query: keyword.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self
            .results
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| self.default_results.clone()))
    }
}

/// Fetcher serving canned pages; unknown URLs fail
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, FetchedPage>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                url: url.to_string(),
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PageFetch for StaticFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedPage, WebError> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| WebError::Fetch {
            url: url.to_string(),
            reason: "not found".to_string(),
        })
    }
}
