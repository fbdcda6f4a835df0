//! Query orchestration.
//!
//! `Init → DirectAttempt → Verify → {Answered | Unanswered → Retrieve → Reground} → Done`
//!
//! A generation failure at any step aborts the run with `GenerationFailed`.
//! A retrieval failure degrades to an empty context and the run continues.

use crate::types::{Answer, Stage};
use relay_core::config::RetrievalConfig;
use relay_core::{AppError, AppResult};
use relay_llm::Generator;
use relay_prompt::{verification_outcome, PromptEngine};
use relay_retrieval::{build_context, with_date_preamble, RelevanceFilter, RetrievalResult, Retriever};
use std::sync::Arc;

/// Tunables of the retrieval fallback.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Threshold and cap applied to search results
    pub filter: RelevanceFilter,

    /// Prefix non-empty context with today's date
    pub date_preamble: bool,
}

impl From<&RetrievalConfig> for OrchestratorConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            filter: RelevanceFilter::from(config),
            date_preamble: config.date_preamble,
        }
    }
}

/// Anything that turns query text into answer text.
#[async_trait::async_trait]
pub trait Answerer: Send + Sync {
    async fn answer_text(&self, query: &str) -> AppResult<String>;
}

/// Context gathered for the grounded pass.
struct RetrievedContext {
    text: String,
    sources: Vec<RetrievalResult>,
    degraded: bool,
}

/// Drives prompts, generation and retrieval through the two-stage flow.
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    prompts: PromptEngine,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        prompts: PromptEngine,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            generator,
            retriever,
            prompts,
            config,
        }
    }

    /// Answer one query.
    pub async fn answer(&self, query: &str) -> AppResult<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Other("Query text is empty".to_string()));
        }

        tracing::info!(stage = %Stage::Init, "Processing query: {}", query);

        let direct_prompt = self.prompts.build_direct(query)?;
        let direct = self.generate(Stage::DirectAttempt, &direct_prompt).await?;
        tracing::debug!("Direct answer: {}", direct);

        let verification_prompt = self.prompts.build_verification(query, &direct)?;
        let verdict = self.generate(Stage::Verify, &verification_prompt).await?;
        let outcome = verification_outcome(&verdict);
        tracing::debug!("Verification reply: {} ({:?})", verdict, outcome);

        if outcome.is_answered() {
            tracing::info!(stage = %Stage::Answered, "Direct answer accepted");
            return Ok(Answer::direct(direct));
        }

        tracing::info!(stage = %Stage::Unanswered, "Direct answer rejected, retrieving context");

        let context = self.retrieve_context(query).await;

        let grounded_prompt = self.prompts.build_grounded(query, &context.text)?;
        let grounded = self.generate(Stage::Reground, &grounded_prompt).await?;

        tracing::info!(
            stage = %Stage::Done,
            "Grounded answer produced from {} sources",
            context.sources.len()
        );

        Ok(Answer::grounded(grounded, context.sources, context.degraded))
    }

    async fn generate(&self, stage: Stage, prompt: &str) -> AppResult<String> {
        tracing::info!(stage = %stage, "Invoking generation engine");

        self.generator.generate(prompt).await.map_err(|e| {
            tracing::error!(stage = %stage, "Generation failed: {}", e);
            e.into_generation_failed()
        })
    }

    async fn retrieve_context(&self, query: &str) -> RetrievedContext {
        tracing::info!(stage = %Stage::Retrieve, "Retrieving context");

        match self.retriever.retrieve(query).await {
            Ok(results) => {
                let sources = self.config.filter.apply(results);
                let mut text = build_context(&sources);

                if self.config.date_preamble {
                    text = with_date_preamble(text, chrono::Local::now().date_naive());
                }

                tracing::debug!("Context ({} bytes): {}", text.len(), text);

                RetrievedContext {
                    text,
                    sources,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    stage = %Stage::Retrieve,
                    "Retrieval unavailable, continuing without context: {}",
                    e
                );

                RetrievedContext {
                    text: String::new(),
                    sources: Vec::new(),
                    degraded: true,
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Answerer for Orchestrator {
    async fn answer_text(&self, query: &str) -> AppResult<String> {
        self.answer(query).await.map(|answer| answer.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerRoute;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generator that replays scripted replies and records prompts.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<AppResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<AppResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn ok(replies: &[&str]) -> Arc<Self> {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> AppResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::EngineUnavailable("script exhausted".to_string())))
        }
    }

    /// Retriever returning a fixed outcome and counting calls.
    struct FakeRetriever {
        outcome: Mutex<Option<AppResult<Vec<RetrievalResult>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRetriever {
        fn new(outcome: AppResult<Vec<RetrievalResult>>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievalResult>> {
            self.calls.lock().unwrap().push(query.to_string());
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>, retriever: Arc<FakeRetriever>) -> Orchestrator {
        Orchestrator::new(
            generator,
            retriever,
            PromptEngine::new().unwrap(),
            OrchestratorConfig {
                filter: RelevanceFilter::new(0.3, 5),
                date_preamble: false,
            },
        )
    }

    fn match_results() -> Vec<RetrievalResult> {
        vec![
            RetrievalResult::new("Report", "http://news/1", "The home side won 2-1.", Some(0.9)),
            RetrievalResult::new("Recap", "http://news/2", "A late goal decided it.", Some(0.7)),
            RetrievalResult::new("Table", "http://news/3", "They moved up to second.", Some(0.5)),
        ]
    }

    #[tokio::test]
    async fn test_verified_direct_answer_short_circuits() {
        let generator = ScriptedGenerator::ok(&["4", "Yes, the text answers the question."]);
        let retriever = FakeRetriever::new(Ok(match_results()));
        let orchestrator = orchestrator(generator.clone(), retriever.clone());

        let answer = orchestrator.answer("What is 2+2?").await.unwrap();

        assert_eq!(answer.text, "4");
        assert_eq!(answer.route, AnswerRoute::Direct);
        assert_eq!(retriever.calls(), 0);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("What is 2+2?"));
        assert!(prompts[1].contains("Question: What is 2+2?\nText: 4"));
    }

    #[tokio::test]
    async fn test_rejected_answer_is_regrounded() {
        let generator = ScriptedGenerator::ok(&[
            "I do not have information about recent matches.",
            "No",
            "The home side won 2-1 thanks to a late goal.",
        ]);
        let retriever = FakeRetriever::new(Ok(match_results()));
        let orchestrator = orchestrator(generator.clone(), retriever.clone());

        let answer = orchestrator.answer("Who won yesterday's match?").await.unwrap();

        assert_eq!(answer.route, AnswerRoute::Grounded);
        assert_eq!(answer.text, "The home side won 2-1 thanks to a late goal.");
        assert_ne!(answer.text, "I do not have information about recent matches.");
        assert_eq!(answer.sources.len(), 3);
        assert!(!answer.retrieval_degraded);
        assert_eq!(retriever.calls(), 1);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 3);
        let grounded = &prompts[2];
        assert!(grounded.contains("ONLY based on the context"));
        assert!(grounded.contains("The home side won 2-1."));
        assert!(grounded.contains("A late goal decided it."));
        assert!(grounded.contains("They moved up to second."));
        assert!(grounded.contains("Who won yesterday's match?"));
    }

    #[tokio::test]
    async fn test_low_scoring_results_stay_out_of_context() {
        let generator = ScriptedGenerator::ok(&["?", "No", "grounded"]);
        let retriever = FakeRetriever::new(Ok(vec![
            RetrievalResult::new("Keep", "http://a", "relevant fact", Some(0.9)),
            RetrievalResult::new("Drop", "http://b", "noise", Some(0.1)),
        ]));
        let orchestrator = orchestrator(generator.clone(), retriever);

        let answer = orchestrator.answer("q").await.unwrap();

        assert_eq!(answer.sources.len(), 1);
        let grounded = &generator.prompts()[2];
        assert!(grounded.contains("relevant fact"));
        assert!(!grounded.contains("noise"));
    }

    #[tokio::test]
    async fn test_nothing_above_threshold_gives_empty_context() {
        let generator = ScriptedGenerator::ok(&["?", "No", "I cannot answer that."]);
        let retriever = FakeRetriever::new(Ok(vec![
            RetrievalResult::new("Weak", "http://a", "barely related", Some(0.2)),
            RetrievalResult::new("Unscored", "http://b", "no score at all", None),
        ]));
        let orchestrator = Orchestrator::new(
            generator.clone(),
            retriever.clone(),
            PromptEngine::new().unwrap(),
            OrchestratorConfig {
                filter: RelevanceFilter::new(0.3, 5),
                date_preamble: true,
            },
        );

        let answer = orchestrator.answer("Who won yesterday's match?").await.unwrap();

        assert_eq!(answer.route, AnswerRoute::Grounded);
        assert!(answer.sources.is_empty());
        assert!(!answer.retrieval_degraded);
        assert_eq!(retriever.calls(), 1);

        let grounded = &generator.prompts()[2];
        assert!(grounded.contains("No context information is available"));
        assert!(!grounded.contains("For reference, today is"));
        assert!(!grounded.contains("barely related"));
        assert!(!grounded.contains("no score at all"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_empty_context() {
        let generator = ScriptedGenerator::ok(&["dunno", "No", "I cannot answer that."]);
        let retriever = FakeRetriever::new(Err(AppError::RetrievalUnavailable(
            "connection refused".to_string(),
        )));
        let orchestrator = orchestrator(generator.clone(), retriever.clone());

        let answer = orchestrator.answer("Who won yesterday's match?").await.unwrap();

        assert_eq!(answer.text, "I cannot answer that.");
        assert_eq!(answer.route, AnswerRoute::Grounded);
        assert!(answer.retrieval_degraded);
        assert!(answer.sources.is_empty());
        assert_eq!(retriever.calls(), 1);
        assert!(generator.prompts()[2].contains("No context information is available"));
    }

    #[tokio::test]
    async fn test_direct_generation_failure_aborts() {
        let generator = ScriptedGenerator::new(vec![Err(AppError::EngineUnavailable(
            "connection refused".to_string(),
        ))]);
        let retriever = FakeRetriever::new(Ok(match_results()));
        let orchestrator = orchestrator(generator.clone(), retriever.clone());

        let result = orchestrator.answer("What is 2+2?").await;

        assert!(matches!(result, Err(AppError::GenerationFailed(_))));
        assert_eq!(generator.prompts().len(), 1);
        assert_eq!(retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_verification_timeout_aborts() {
        let generator = ScriptedGenerator::new(vec![
            Ok("4".to_string()),
            Err(AppError::EngineTimeout(std::time::Duration::from_secs(1))),
        ]);
        let retriever = FakeRetriever::new(Ok(match_results()));
        let orchestrator = orchestrator(generator, retriever.clone());

        let result = orchestrator.answer("What is 2+2?").await;

        assert!(matches!(result, Err(AppError::GenerationFailed(_))));
        assert_eq!(retriever.calls(), 0);
    }

    #[tokio::test]
    async fn test_reground_failure_aborts() {
        let generator = ScriptedGenerator::new(vec![
            Ok("?".to_string()),
            Ok("No".to_string()),
            Err(AppError::EngineUnavailable("gone".to_string())),
        ]);
        let retriever = FakeRetriever::new(Ok(match_results()));
        let orchestrator = orchestrator(generator, retriever);

        let result = orchestrator.answer("Who won?").await;
        assert!(matches!(result, Err(AppError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_without_generation() {
        let generator = ScriptedGenerator::ok(&[]);
        let retriever = FakeRetriever::new(Ok(Vec::new()));
        let orchestrator = orchestrator(generator.clone(), retriever);

        assert!(orchestrator.answer("   ").await.is_err());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_answerer_returns_text() {
        let generator = ScriptedGenerator::ok(&["Paris", "yes"]);
        let retriever = FakeRetriever::new(Ok(Vec::new()));
        let orchestrator = orchestrator(generator, retriever);

        let text = orchestrator.answer_text("Capital of France?").await.unwrap();
        assert_eq!(text, "Paris");
    }

    #[test]
    fn test_config_from_retrieval_config() {
        let config = OrchestratorConfig::from(&RetrievalConfig::default());
        assert_eq!(config.filter, RelevanceFilter::new(1.5, 5));
        assert!(config.date_preamble);
    }
}
