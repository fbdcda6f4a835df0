//! Query pipeline for the relay.
//!
//! Answers a query directly when the model can, and falls back to a
//! retrieval-grounded second pass when a verification step judges the direct
//! answer inadequate.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{Answerer, Orchestrator, OrchestratorConfig};
pub use types::{Answer, AnswerRoute, Stage};
