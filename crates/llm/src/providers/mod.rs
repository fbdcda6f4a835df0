//! Generation backend implementations.

pub mod llama_cpp;
pub mod ollama;

pub use llama_cpp::LlamaCppClient;
pub use ollama::OllamaClient;

use relay_core::AppError;

/// Map a non-2xx backend response to `EngineUnavailable`.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    AppError::EngineUnavailable(format!("{} API error ({}): {}", provider, status, error_text))
}
