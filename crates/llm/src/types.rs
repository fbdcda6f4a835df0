//! Provider and generation policy types.

use relay_core::config::LlmConfig;
use std::time::Duration;

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    LlamaCpp,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "llama-cpp" | "llamacpp" | "llama.cpp" => Some(Self::LlamaCpp),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LlamaCpp => "llama-cpp",
        }
    }
}

/// How generate calls are issued against one engine instance.
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    /// Calls allowed in flight at once; 1 per accelerator is typical
    pub max_concurrency: usize,

    /// Upper bound for one call, not counting time spent queued
    pub timeout: Duration,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            timeout: Duration::from_secs(120),
            max_tokens: None,
            temperature: None,
        }
    }
}

impl From<&LlmConfig> for GenerationPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            timeout: config.timeout(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}
