//! Parsing of raw generation output.

use crate::types::{ASSISTANT_MARKER, END_OF_TEXT, END_OF_TURN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static YES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\byes\b").unwrap());

/// Extract the assistant's answer from raw engine output.
///
/// Trailing end markers are stripped; if the output echoes the assistant
/// header, only the text after its last occurrence is kept. Output without
/// the header is returned trimmed. Total and idempotent.
pub fn extract_assistant_reply(raw: &str) -> String {
    let mut text = raw.trim_end();

    loop {
        let stripped = [END_OF_TEXT, END_OF_TURN]
            .iter()
            .find_map(|marker| text.strip_suffix(marker));

        match stripped {
            Some(rest) => text = rest.trim_end(),
            None => break,
        }
    }

    match text.rfind(ASSISTANT_MARKER) {
        Some(idx) => text[idx + ASSISTANT_MARKER.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Parse the engine's reply to a verification prompt.
pub fn verification_outcome(reply: &str) -> VerificationOutcome {
    VerificationOutcome::from_reply(reply)
}

/// Result of asking the engine whether an answer resolves the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationOutcome {
    Answered,
    Unanswered,
}

impl VerificationOutcome {
    /// `Answered` when the reply contains "yes" as a whole word, any case.
    pub fn from_reply(reply: &str) -> Self {
        if YES.is_match(reply) {
            Self::Answered
        } else {
            Self::Unanswered
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered)
    }
}
