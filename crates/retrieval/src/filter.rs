//! Relevance filtering of retrieval results.

use crate::types::RetrievalResult;
use relay_core::config::RetrievalConfig;

/// Threshold and cap applied before results become context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceFilter {
    /// Minimum relevance score (inclusive)
    pub min_score: f32,

    /// Maximum number of results kept
    pub max_results: usize,
}

impl RelevanceFilter {
    pub fn new(min_score: f32, max_results: usize) -> Self {
        Self {
            min_score,
            max_results,
        }
    }

    /// Drop results below the threshold, order by descending score, cap.
    ///
    /// The sort is stable, so equally scored results keep the engine's order.
    pub fn apply(&self, results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        let total = results.len();

        let mut kept: Vec<RetrievalResult> = results
            .into_iter()
            .filter(|r| r.relevance() >= self.min_score)
            .collect();

        kept.sort_by(|a, b| b.relevance().total_cmp(&a.relevance()));
        kept.truncate(self.max_results);

        tracing::debug!(
            "Kept {} of {} results (min score {:.2}, cap {})",
            kept.len(),
            total,
            self.min_score,
            self.max_results
        );

        kept
    }
}

impl From<&RetrievalConfig> for RelevanceFilter {
    fn from(config: &RetrievalConfig) -> Self {
        Self::new(config.min_score, config.max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(scores: &[f32]) -> Vec<RetrievalResult> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| RetrievalResult::new(format!("r{}", i), "", "", Some(*s)))
            .collect()
    }

    fn scores(results: &[RetrievalResult]) -> Vec<f32> {
        results.iter().map(|r| r.relevance()).collect()
    }

    #[test]
    fn test_threshold_keeps_ranked_survivors() {
        let kept = RelevanceFilter::new(0.3, 10).apply(scored(&[0.9, 0.4, 0.1]));
        assert_eq!(scores(&kept), vec![0.9, 0.4]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kept = RelevanceFilter::new(1.5, 10).apply(scored(&[1.5, 1.49]));
        assert_eq!(scores(&kept), vec![1.5]);
    }

    #[test]
    fn test_cap_keeps_highest() {
        let kept = RelevanceFilter::new(0.0, 2).apply(scored(&[0.2, 0.8, 0.5]));
        assert_eq!(scores(&kept), vec![0.8, 0.5]);
    }

    #[test]
    fn test_ties_keep_engine_order() {
        let kept = RelevanceFilter::new(0.0, 3).apply(scored(&[0.5, 0.5, 0.5]));
        let titles: Vec<&str> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["r0", "r1", "r2"]);
    }

    #[test]
    fn test_missing_score_ranks_as_zero() {
        let mut results = scored(&[0.7]);
        results.push(RetrievalResult::new("unscored", "", "", None));

        assert_eq!(RelevanceFilter::new(0.3, 5).apply(results.clone()).len(), 1);
        assert_eq!(RelevanceFilter::new(0.0, 5).apply(results).len(), 2);
    }

    #[test]
    fn test_nothing_survives() {
        assert!(RelevanceFilter::new(1.5, 5).apply(scored(&[0.9, 0.4])).is_empty());
        assert!(RelevanceFilter::new(1.5, 5).apply(Vec::new()).is_empty());
    }
}
