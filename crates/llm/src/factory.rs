//! LLM provider factory.
//!
//! Creates generation backends from a provider name and optional endpoint.

use crate::client::LlmClient;
use crate::providers::{llama_cpp, ollama, LlamaCppClient, OllamaClient};
use crate::types::ProviderType;
use relay_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "llama-cpp")
/// * `endpoint` - Optional custom endpoint URL
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let client: Arc<dyn LlmClient> = match provider_type {
        ProviderType::Ollama => Arc::new(OllamaClient::with_base_url(
            endpoint.unwrap_or(ollama::DEFAULT_OLLAMA_URL),
        )),
        ProviderType::LlamaCpp => Arc::new(LlamaCppClient::with_base_url(
            endpoint.unwrap_or(llama_cpp::DEFAULT_LLAMA_CPP_URL),
        )),
    };

    tracing::debug!("Created {} generation backend", client.provider_name());

    Ok(client)
}
