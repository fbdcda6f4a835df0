//! llama.cpp server provider implementation.
//!
//! Talks to the `/completion` endpoint of `llama-server`.

use super::status_error;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use relay_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Default llama.cpp server endpoint.
pub const DEFAULT_LLAMA_CPP_URL: &str = "http://localhost:8081";

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens_evaluated: Option<u32>,
    #[serde(default)]
    tokens_predicted: Option<u32>,
}

/// Client for a llama.cpp HTTP server.
pub struct LlamaCppClient {
    base_url: String,
    client: reqwest::Client,
}

impl LlamaCppClient {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn to_completion_request(&self, request: &LlmRequest) -> CompletionRequest {
        CompletionRequest {
            prompt: request.prompt.clone(),
            stream: false,
            n_predict: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for LlamaCppClient {
    fn provider_name(&self) -> &str {
        "llama-cpp"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let url = format!("{}/completion", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.to_completion_request(request))
            .send()
            .await
            .map_err(|e| {
                AppError::EngineUnavailable(format!("Failed to send request to llama.cpp: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(status_error("llama.cpp", response).await);
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            AppError::EngineUnavailable(format!("Failed to parse llama.cpp response: {}", e))
        })?;

        Ok(LlmResponse {
            content: completion.content,
            model: completion.model.unwrap_or_else(|| request.model.clone()),
            usage: LlmUsage::new(
                completion.tokens_evaluated.unwrap_or(0),
                completion.tokens_predicted.unwrap_or(0),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_conversion() {
        let client = LlamaCppClient::with_base_url(DEFAULT_LLAMA_CPP_URL);
        let req = client.to_completion_request(&LlmRequest::new("Hi", "ignored").with_max_tokens(64));

        assert_eq!(req.prompt, "Hi");
        assert_eq!(req.n_predict, Some(64));
        assert!(!req.stream);
        assert_eq!(client.provider_name(), "llama-cpp");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: CompletionResponse = serde_json::from_str(
            r#"{"content":" Paris","stop":true,"tokens_evaluated":10,"tokens_predicted":1}"#,
        )
        .unwrap();
        assert_eq!(parsed.content, " Paris");
        assert!(parsed.model.is_none());
        assert_eq!(parsed.tokens_predicted, Some(1));
    }
}
