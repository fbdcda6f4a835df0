//! Serve command handler.
//!
//! Wires the generation client, retriever and orchestrator into the RPC
//! gateway and runs it until interrupted.

use clap::Args;
use relay_core::config::{AppConfig, ConfigOverrides};
use relay_core::{AckMode, AppResult};
use relay_gateway::GatewayService;
use relay_llm::GenerationClient;
use relay_pipeline::{Orchestrator, OrchestratorConfig};
use relay_prompt::PromptEngine;
use relay_retrieval::SearxngClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Answer queries from the inbound queue
#[derive(Args, Debug, Default)]
pub struct ServeCommand {
    /// Inbound queue name
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Number of consume loops
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// When to acknowledge messages (before-processing, after-reply)
    #[arg(long)]
    pub ack_mode: Option<AckMode>,

    /// Generation backend (ollama, llama-cpp)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Generation backend base URL
    #[arg(long)]
    pub llm_endpoint: Option<String>,

    /// SearXNG base URL
    #[arg(long)]
    pub search_url: Option<String>,

    /// Minimum relevance score for retrieved results
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Maximum retrieved results used as context
    #[arg(long)]
    pub max_results: Option<usize>,
}

impl ServeCommand {
    /// Fill the command-specific fields of `overrides`.
    pub fn apply_overrides(&self, overrides: &mut ConfigOverrides) {
        overrides.queue = self.queue.clone();
        overrides.workers = self.workers;
        overrides.ack_mode = self.ack_mode;
        overrides.provider = self.provider.clone();
        overrides.model = self.model.clone();
        overrides.llm_endpoint = self.llm_endpoint.clone();
        overrides.search_url = self.search_url.clone();
        overrides.min_score = self.min_score;
        overrides.max_results = self.max_results;
    }

    /// Execute the serve command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");
        tracing::debug!(
            "Provider: {}, model: {}, search: {}",
            config.llm.provider,
            config.llm.model,
            config.retrieval.endpoint
        );

        let generator = Arc::new(GenerationClient::from_config(&config.llm)?);
        let retriever = Arc::new(SearxngClient::from_config(&config.retrieval)?);
        let prompts = PromptEngine::new()?;

        let orchestrator = Arc::new(Orchestrator::new(
            generator,
            retriever,
            prompts,
            OrchestratorConfig::from(&config.retrieval),
        ));

        let service = GatewayService::new(
            config.broker.clone(),
            config.gateway.clone(),
            orchestrator,
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        service.run(shutdown).await
    }
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, finishing in-flight message");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_copy_every_flag() {
        let command = ServeCommand {
            queue: Some("questions".to_string()),
            workers: Some(3),
            ack_mode: Some(AckMode::AfterReply),
            provider: Some("llama-cpp".to_string()),
            model: Some("llama3".to_string()),
            llm_endpoint: Some("http://gpu:8081".to_string()),
            search_url: Some("http://search:8080/".to_string()),
            min_score: Some(0.3),
            max_results: Some(2),
        };

        let mut overrides = ConfigOverrides::default();
        command.apply_overrides(&mut overrides);

        let config = AppConfig::default().with_overrides(overrides);
        assert_eq!(config.broker.queue, "questions");
        assert_eq!(config.gateway.workers, 3);
        assert_eq!(config.gateway.ack_mode, AckMode::AfterReply);
        assert_eq!(config.llm.provider, "llama-cpp");
        assert_eq!(config.llm.endpoint.as_deref(), Some("http://gpu:8081"));
        assert_eq!(config.retrieval.endpoint, "http://search:8080/");
        assert_eq!(config.retrieval.min_score, 0.3);
        assert_eq!(config.retrieval.max_results, 2);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut overrides = ConfigOverrides::default();
        ServeCommand::default().apply_overrides(&mut overrides);

        let config = AppConfig::default().with_overrides(overrides);
        assert_eq!(config.broker.queue, "frontend_to_backend");
        assert_eq!(config.gateway.workers, 1);
    }
}
