//! Pipeline result types.

use relay_retrieval::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    DirectAttempt,
    Verify,
    Answered,
    Unanswered,
    Retrieve,
    Reground,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::DirectAttempt => "direct_attempt",
            Self::Verify => "verify",
            Self::Answered => "answered",
            Self::Unanswered => "unanswered",
            Self::Retrieve => "retrieve",
            Self::Reground => "reground",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerRoute {
    /// The direct answer passed verification
    Direct,
    /// The answer was regenerated from retrieved context
    Grounded,
}

/// Final answer of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub route: AnswerRoute,

    /// Results embedded as context (grounded route only)
    pub sources: Vec<RetrievalResult>,

    /// Retrieval failed and the grounded pass ran without context
    pub retrieval_degraded: bool,
}

impl Answer {
    pub fn direct(text: String) -> Self {
        Self {
            text,
            route: AnswerRoute::Direct,
            sources: Vec::new(),
            retrieval_degraded: false,
        }
    }

    pub fn grounded(text: String, sources: Vec<RetrievalResult>, retrieval_degraded: bool) -> Self {
        Self {
            text,
            route: AnswerRoute::Grounded,
            sources,
            retrieval_degraded,
        }
    }
}
