// Fragment Matcher
// Locates query passages that closely match passages of the reference texts.

use tracing::debug;

use super::engine::{SimilarityEngine, SimilarityError};
use crate::models::{Fragment, SimilarityWeights};
use crate::services::text_processor::split_sentences_raw;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_FRAGMENT_SIZE: usize = 100;
const PREFILTER_RATIO: f64 = 0.8;
const MIN_FRAGMENT_CHARS: usize = 20;
const MAX_MATCHES: usize = 10;

/// Greedily join consecutive sentences until the accumulated sentence length reaches
/// `size`, then start a new fragment. Fragments under 20 chars are dropped.
pub fn split_into_fragments(text: &str, size: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for sentence in split_sentences_raw(text) {
        current_len += sentence.chars().count();
        current.push(sentence);
        if current_len >= size {
            fragments.push(current.join(". "));
            current.clear();
            current_len = 0;
        }
    }
    if !current.is_empty() {
        fragments.push(current.join(". "));
    }

    fragments
        .into_iter()
        .filter(|f| f.chars().count() >= MIN_FRAGMENT_CHARS)
        .collect()
}

#[derive(Clone)]
pub struct FragmentMatcher {
    engine: SimilarityEngine,
    threshold: f64,
    fragment_size: usize,
    weights: SimilarityWeights,
}

impl FragmentMatcher {
    pub fn new(engine: SimilarityEngine) -> Self {
        Self {
            engine,
            threshold: DEFAULT_THRESHOLD,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            weights: SimilarityWeights::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size.max(1);
        self
    }

    pub fn with_weights(mut self, weights: SimilarityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Up to 10 query fragments scoring at least `threshold` against some corpus
    /// fragment, best first. Ties keep discovery order.
    pub async fn find_matching_fragments(
        &self,
        query: &str,
        corpus_texts: &[&str],
    ) -> Result<Vec<Fragment>, SimilarityError> {
        self.weights.validate()?;

        let query_fragments = split_into_fragments(query, self.fragment_size);
        let prefilter = self.threshold * PREFILTER_RATIO;
        let mut matches = Vec::new();
        let mut rescored = 0usize;

        for (idx, corpus_text) in corpus_texts.iter().enumerate() {
            let corpus_fragments = split_into_fragments(corpus_text, self.fragment_size);

            for q_frag in &query_fragments {
                for c_frag in &corpus_fragments {
                    if self.engine.fuzzy_similarity(q_frag, c_frag).value() < prefilter {
                        continue;
                    }
                    rescored += 1;
                    let combined = self
                        .engine
                        .combined_score(q_frag, c_frag, Some(&self.weights))
                        .await?;
                    if combined.overall >= self.threshold {
                        matches.push(Fragment {
                            text: q_frag.clone(),
                            score: combined.overall,
                            source_index: idx + 1,
                            matched_text: c_frag.clone(),
                            source_title: None,
                            source_url: None,
                        });
                    }
                }
            }
        }

        // `sort_by` is stable, so equal scores stay in discovery order.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(MAX_MATCHES);

        debug!(
            query_fragments = query_fragments.len(),
            rescored,
            matched = matches.len(),
            "fragment search done"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::stubs::TopicEmbeddingModel;
    use std::sync::Arc;

    fn matcher() -> FragmentMatcher {
        FragmentMatcher::new(SimilarityEngine::new(Arc::new(TopicEmbeddingModel)))
    }

    #[test]
    fn test_split_into_fragments_accumulates_sentences() {
        let text = "Short one. Another short sentence here! \
                    This third sentence is long enough to push the fragment over the limit. Tail end";
        let fragments = split_into_fragments(text, 60);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Short one. Another short sentence here. This third"));
        // "Tail end" is a trailing fragment under 20 chars and is dropped.
        assert!(!fragments.iter().any(|f| f == "Tail end"));
    }

    #[test]
    fn test_split_into_fragments_empty() {
        assert!(split_into_fragments("", 100).is_empty());
        assert!(split_into_fragments("tiny.", 100).is_empty());
    }

    #[tokio::test]
    async fn test_copied_passage_is_found_with_source_index() {
        let copied = "quantum computing uses qubits that exist in superposition of states, \
                      enabling massive parallel computation for certain problems";
        let query = format!("an unrelated opening sentence about gardening and soil. {}", copied);
        let corpus = [
            "blockchain is a distributed ledger that records transactions across many computers",
            copied,
        ];
        let found = matcher().find_matching_fragments(&query, &corpus).await.unwrap();
        assert!(!found.is_empty());
        assert_eq!(found[0].source_index, 2);
        assert!(found[0].score >= DEFAULT_THRESHOLD);
    }

    #[tokio::test]
    async fn test_results_sorted_and_capped() {
        let passage = "neural networks are computing systems inspired by biological brains and \
                       learn tasks by considering examples";
        let corpus: Vec<&str> = std::iter::repeat(passage).take(12).collect();
        let found = matcher()
            .with_threshold(0.5)
            .find_matching_fragments(passage, &corpus)
            .await
            .unwrap();
        assert_eq!(found.len(), 10);
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
        // Equal scores keep corpus order.
        let indices: Vec<usize> = found.iter().map(|f| f.source_index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_invalid_weights_fail_before_scoring() {
        let weights = SimilarityWeights {
            character: 1.0,
            fuzzy: 1.0,
            lexical: 0.0,
            semantic: 0.0,
        };
        let err = matcher()
            .with_weights(weights)
            .find_matching_fragments("", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SimilarityError::WeightSum(_)));
    }
}
