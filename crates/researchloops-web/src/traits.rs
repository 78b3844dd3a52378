use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Search failed for `{query}`: {reason}")]
    Search { query: String, reason: String },

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A fetched page reduced to text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return result URLs for a keyword query, best first
    async fn search(&self, keyword: &str) -> Result<Vec<String>, WebError>;
}

#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, WebError>;
}
