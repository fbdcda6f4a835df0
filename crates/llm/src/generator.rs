//! Generation Client: the prompt-in, text-out capability used by the pipeline.
//!
//! One engine instance is a shared, non-reentrant resource. Calls are
//! serialized through a semaphore sized by `GenerationPolicy::max_concurrency`
//! and each call is bounded by `GenerationPolicy::timeout`.

use crate::client::{LlmClient, LlmRequest};
use crate::factory::create_client;
use crate::types::GenerationPolicy;
use relay_core::config::LlmConfig;
use relay_core::{AppError, AppResult};
use relay_prompt::extract_assistant_reply;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Text generation capability.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply for a fully rendered prompt.
    ///
    /// Fails with `EngineUnavailable` or `EngineTimeout`.
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}

/// Generator backed by an `LlmClient`, with explicit concurrency and timeout policy.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn LlmClient>,
    model: String,
    policy: GenerationPolicy,
    permits: Arc<Semaphore>,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn LlmClient>, model: impl Into<String>, policy: GenerationPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            backend,
            model: model.into(),
            policy,
            permits,
        }
    }

    /// Build the backend named in the config and wrap it.
    pub fn from_config(config: &LlmConfig) -> AppResult<Self> {
        let backend = create_client(&config.provider, config.endpoint.as_deref())?;
        Ok(Self::new(backend, config.model.clone(), GenerationPolicy::from(config)))
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    fn request(&self, prompt: &str) -> LlmRequest {
        let mut request = LlmRequest::new(prompt, &self.model).with_raw();

        if let Some(max_tokens) = self.policy.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        if let Some(temperature) = self.policy.temperature {
            request = request.with_temperature(temperature);
        }

        request
    }
}

#[async_trait::async_trait]
impl Generator for GenerationClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::EngineUnavailable(format!("Engine permit pool closed: {}", e)))?;

        let request = self.request(prompt);

        let response = tokio::time::timeout(self.policy.timeout, self.backend.complete(&request))
            .await
            .map_err(|_| AppError::EngineTimeout(self.policy.timeout))??;

        tracing::debug!(
            "Generation finished ({} prompt tokens, {} completion tokens)",
            response.usage.prompt_tokens,
            response.usage.completion_tokens
        );

        Ok(extract_assistant_reply(&response.content))
    }
}
