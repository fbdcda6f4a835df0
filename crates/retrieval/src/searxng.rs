//! SearXNG retrieval backend.

use crate::types::{RetrievalResult, Retriever, SearchResponse};
use relay_core::config::RetrievalConfig;
use relay_core::{AppError, AppResult};
use reqwest::Client;
use std::time::Duration;

/// Some instances refuse requests without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Client for the JSON API of a SearXNG instance.
#[derive(Debug, Clone)]
pub struct SearxngClient {
    endpoint: String,
    client: Client,
}

impl SearxngClient {
    /// Create a client; `timeout` bounds each search.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client for SearXNG: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> AppResult<Self> {
        Self::new(config.endpoint.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Retriever for SearxngClient {
    async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievalResult>> {
        tracing::info!("Searching SearXNG for: {}", query);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::RetrievalUnavailable(format!("SearXNG request timed out: {}", e))
                } else {
                    AppError::RetrievalUnavailable(format!("Failed to reach SearXNG: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::RetrievalUnavailable(format!(
                "SearXNG returned {}",
                status
            )));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            AppError::RetrievalUnavailable(format!("Failed to parse SearXNG response: {}", e))
        })?;

        tracing::info!("SearXNG returned {} results", body.results.len());

        Ok(body.results)
    }
}
