//! Retrieval types.

use relay_core::AppResult;
use serde::{Deserialize, Serialize};

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    /// Snippet text returned by the search engine
    #[serde(default)]
    pub content: String,

    /// Engine relevance score; absent on some result types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievalResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        score: Option<f32>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score,
        }
    }

    /// Score used for ranking; a missing score ranks as 0.0.
    pub fn relevance(&self) -> f32 {
        self.score.unwrap_or(0.0)
    }
}

/// JSON body of a SearXNG search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<RetrievalResult>,
}

/// Query-in, ranked-results-out capability.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Fails with `RetrievalUnavailable`.
    async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievalResult>>;
}
