//! LLM integration crate for the relay.
//!
//! This crate provides a provider-agnostic abstraction for talking to a
//! generation engine, plus the serialized `GenerationClient` the query
//! pipeline calls.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **llama.cpp**: `llama-server` completion endpoint
//!
//! # Example
//! ```no_run
//! use relay_llm::{GenerationClient, GenerationPolicy, Generator, OllamaClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GenerationClient::new(
//!     Arc::new(OllamaClient::new()),
//!     "llama3.2",
//!     GenerationPolicy::default(),
//! );
//! let text = client.generate("<|begin_of_text|>...").await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod generator;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use generator::{GenerationClient, Generator};
pub use providers::{LlamaCppClient, OllamaClient};
pub use types::{GenerationPolicy, ProviderType};
