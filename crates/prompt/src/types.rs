//! Prompt types for the relay.
//!
//! A prompt is an ordered list of role-tagged segments rendered into the
//! Llama 3 chat format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Start of a rendered prompt.
pub const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";

/// Opens a role header.
pub const START_HEADER: &str = "<|start_header_id|>";

/// Closes a role header.
pub const END_HEADER: &str = "<|end_header_id|>";

/// Closes a segment.
pub const END_OF_TURN: &str = "<|eot_id|>";

/// End-of-sequence marker some engines append to their output.
pub const END_OF_TEXT: &str = "<|end_of_text|>";

/// Header that opens the assistant segment.
pub const ASSISTANT_MARKER: &str = "<|start_header_id|>assistant<|end_header_id|>";

/// Speaker of a prompt segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged piece of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub role: Role,
    pub text: String,
}

impl Segment {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// An empty assistant segment, left open for the engine to complete.
    pub fn assistant_open() -> Self {
        Self::new(Role::Assistant, String::new())
    }

    fn is_open(&self) -> bool {
        self.role == Role::Assistant && self.text.is_empty()
    }
}

/// Purpose of a prompt, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Answer from the model's own knowledge
    Direct,
    /// Answer only from supplied context
    Grounded,
    /// Judge whether a candidate answer resolves the query
    Verification,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Grounded => "grounded",
            Self::Verification => "verification",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built prompt: system, user, then an open assistant segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub kind: PromptKind,
    pub segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Create a prompt in the fixed `system`, `user`, `assistant-open` order.
    pub fn new(kind: PromptKind, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            kind,
            segments: vec![
                Segment::new(Role::System, system),
                Segment::new(Role::User, user),
                Segment::assistant_open(),
            ],
        }
    }

    /// Text of the first segment with the given role.
    pub fn segment(&self, role: Role) -> Option<&str> {
        self.segments
            .iter()
            .find(|s| s.role == role)
            .map(|s| s.text.as_str())
    }

    /// Render into the single prompt string sent to the engine.
    pub fn render(&self) -> String {
        let mut out = String::from(BEGIN_OF_TEXT);

        for segment in &self.segments {
            out.push_str(START_HEADER);
            out.push_str(segment.role.as_str());
            out.push_str(END_HEADER);
            out.push_str("\n\n");

            if segment.is_open() {
                break;
            }

            out.push_str(segment.text.trim());
            out.push_str(END_OF_TURN);
        }

        out
    }
}
