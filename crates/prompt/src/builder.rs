//! Prompt builder for rendering segment templates.

use crate::types::{PromptKind, PromptTemplate};
use handlebars::Handlebars;
use relay_core::{AppError, AppResult};
use serde_json::json;

const DIRECT_SYSTEM: &str = "You are a helpful AI assistant. \
Do not make up any information. Provide a concise answer.";

const GROUNDED_SYSTEM: &str = "You are a helpful AI assistant. \
Provide one answer ONLY based on the context provided below. \
Do not generate or answer any other questions. \
Do not make up or infer any information that is not directly stated in the context. \
{{#if context}}Provide a concise answer. Context:\n\n{{context}}\
{{else}}No context information is available for this question. \
Reply that the question cannot be answered from the available information.{{/if}}";

const VERIFICATION_SYSTEM: &str = "Determine if the following text contains an answer \
to the question. Respond with \"Yes\" or \"No\".";

const QUERY_USER: &str = "{{query}}";

const VERIFICATION_USER: &str = "Question: {{query}}\nText: {{answer}}";

/// Registered segment templates for the three prompt kinds.
///
/// Building is a pure function of the inputs, so one engine can be shared
/// by every in-flight request.
pub struct PromptEngine {
    registry: Handlebars<'static>,
}

impl PromptEngine {
    /// Register all segment templates.
    pub fn new() -> AppResult<Self> {
        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);

        for (name, template) in [
            ("direct.system", DIRECT_SYSTEM),
            ("direct.user", QUERY_USER),
            ("grounded.system", GROUNDED_SYSTEM),
            ("grounded.user", QUERY_USER),
            ("verification.system", VERIFICATION_SYSTEM),
            ("verification.user", VERIFICATION_USER),
        ] {
            registry
                .register_template_string(name, template)
                .map_err(|e| {
                    AppError::Prompt(format!("Failed to register template {}: {}", name, e))
                })?;
        }

        Ok(Self { registry })
    }

    /// Prompt answering the query from the model's own knowledge.
    pub fn build_direct(&self, query: &str) -> AppResult<String> {
        Ok(self.direct(query)?.render())
    }

    /// Prompt answering the query only from `context`.
    pub fn build_grounded(&self, query: &str, context: &str) -> AppResult<String> {
        Ok(self.grounded(query, context)?.render())
    }

    /// Prompt asking whether `candidate` answers the query.
    pub fn build_verification(&self, query: &str, candidate: &str) -> AppResult<String> {
        Ok(self.verification(query, candidate)?.render())
    }

    pub fn direct(&self, query: &str) -> AppResult<PromptTemplate> {
        self.template(PromptKind::Direct, json!({ "query": query }))
    }

    pub fn grounded(&self, query: &str, context: &str) -> AppResult<PromptTemplate> {
        self.template(
            PromptKind::Grounded,
            json!({ "query": query, "context": context.trim() }),
        )
    }

    pub fn verification(&self, query: &str, candidate: &str) -> AppResult<PromptTemplate> {
        self.template(
            PromptKind::Verification,
            json!({ "query": query, "answer": candidate }),
        )
    }

    fn template(&self, kind: PromptKind, data: serde_json::Value) -> AppResult<PromptTemplate> {
        tracing::debug!("Building {} prompt", kind);

        let system = self.render(&format!("{}.system", kind), &data)?;
        let user = self.render(&format!("{}.user", kind), &data)?;

        Ok(PromptTemplate::new(kind, system, user))
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> AppResult<String> {
        self.registry
            .render(name, data)
            .map_err(|e| AppError::Prompt(format!("Failed to render template {}: {}", name, e)))
    }
}
