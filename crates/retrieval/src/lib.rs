//! Web retrieval for grounding answers.
//!
//! Searches a SearXNG instance, keeps the results that clear a relevance
//! threshold and turns them into a context string for the grounded prompt.

pub mod context;
pub mod filter;
pub mod searxng;
pub mod types;

// Re-export commonly used types
pub use context::{build_context, date_preamble, with_date_preamble};
pub use filter::RelevanceFilter;
pub use searxng::SearxngClient;
pub use types::{RetrievalResult, Retriever, SearchResponse};
