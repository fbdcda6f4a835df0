//! Context string construction for grounded prompts.

use crate::types::RetrievalResult;
use chrono::NaiveDate;

/// Concatenate results, in order, into one context string.
///
/// Each result contributes a `title`, `url`, `content` block; blocks are
/// separated by a blank line. No results yield an empty string.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| format!("{}\n{}\n{}", r.title.trim(), r.url.trim(), r.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sentence telling the model what "today" is.
pub fn date_preamble(today: NaiveDate) -> String {
    format!(
        "For reference, today is {}, but the following information could be older...",
        today.format("%A, %d %B %Y")
    )
}

/// Prefix non-empty context with the date preamble. Empty context stays empty.
pub fn with_date_preamble(context: String, today: NaiveDate) -> String {
    if context.trim().is_empty() {
        return context;
    }
    format!("{}\n\n{}", date_preamble(today), context)
}
