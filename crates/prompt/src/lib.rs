//! Prompt system for the relay.
//!
//! This crate builds role-segmented chat prompts in the Llama 3 format and
//! parses the assistant reply back out of raw generation output:
//! - Handlebars-rendered segment text
//! - Direct, context-restricted and verification prompts
//! - Assistant reply extraction and yes/no verification parsing

pub mod builder;
pub mod reply;
pub mod types;

// Re-export main types
pub use builder::PromptEngine;
pub use reply::{extract_assistant_reply, verification_outcome, VerificationOutcome};
pub use types::{PromptKind, PromptTemplate, Role, Segment};
