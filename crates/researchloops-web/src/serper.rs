use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{WebError, WebSearch};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

#[derive(Debug, Deserialize)]
struct SerperItem {
    link: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperItem>,
}

/// Web search through the serper.dev Google results API
pub struct SerperSearch {
    http: Client,
    api_key: String,
    top_k: usize,
    endpoint: String,
}

impl SerperSearch {
    pub fn new(http: Client, api_key: String, top_k: usize) -> Self {
        Self {
            http,
            api_key,
            top_k,
            endpoint: SERPER_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<String>, WebError> {
        debug!(query = keyword, top_k = self.top_k, "Searching serper");
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": keyword, "num": self.top_k }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| WebError::Search {
                query: keyword.to_string(),
                reason: e.to_string(),
            })?
            .json::<SerperResponse>()
            .await?;

        Ok(resp
            .organic
            .into_iter()
            .take(self.top_k)
            .map(|item| item.link)
            .collect())
    }
}
