// Similarity Engine
// Runs the four scorers on a text pair and blends them with validated weights.

use thiserror::Error;
use tracing::{debug, warn};

use super::fuzzy::fuzzy_similarity;
use super::semantic::semantic_similarity;
use super::tfidf::TfidfVectorizer;
use crate::models::{CombinedScore, ScoreDiagnostic, ScoreOutcome, ScoreVector, SimilarityWeights};
use crate::services::providers::DynEmbeddingModel;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("Invalid weight for {name}: {value} (must be finite and non-negative)")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("Weights must sum to 1.0, got {0}")]
    WeightSum(f64),
}

impl SimilarityWeights {
    pub fn validate(&self) -> Result<(), SimilarityError> {
        let named = [
            ("character", self.character),
            ("fuzzy", self.fuzzy),
            ("lexical", self.lexical),
            ("semantic", self.semantic),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(SimilarityError::InvalidWeight { name, value });
            }
        }
        let sum: f64 = named.iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(SimilarityError::WeightSum(sum));
        }
        Ok(())
    }
}

fn tfidf_outcome(vectorizer: &TfidfVectorizer, text1: &str, text2: &str) -> ScoreOutcome {
    if text1.trim().is_empty() || text2.trim().is_empty() {
        return ScoreOutcome::Computed(0.0);
    }
    match vectorizer.pair_similarity(text1, text2) {
        Ok(score) => ScoreOutcome::Computed(score),
        Err(e) => ScoreOutcome::degraded(0.0, e.to_string()),
    }
}

/// Four-way text similarity over an injected embedding model.
#[derive(Clone)]
pub struct SimilarityEngine {
    embedder: DynEmbeddingModel,
    character: TfidfVectorizer,
    lexical: TfidfVectorizer,
}

impl SimilarityEngine {
    pub fn new(embedder: DynEmbeddingModel) -> Self {
        Self {
            embedder,
            character: TfidfVectorizer::character(),
            lexical: TfidfVectorizer::lexical(),
        }
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Character 3..=5-gram TF-IDF cosine.
    pub fn character_similarity(&self, text1: &str, text2: &str) -> ScoreOutcome {
        tfidf_outcome(&self.character, text1, text2)
    }

    /// Word 1..=3-gram TF-IDF cosine.
    pub fn lexical_similarity(&self, text1: &str, text2: &str) -> ScoreOutcome {
        tfidf_outcome(&self.lexical, text1, text2)
    }

    pub fn fuzzy_similarity(&self, text1: &str, text2: &str) -> ScoreOutcome {
        fuzzy_similarity(text1, text2)
    }

    pub async fn semantic_similarity(&self, text1: &str, text2: &str) -> ScoreOutcome {
        semantic_similarity(self.embedder.as_ref(), text1, text2).await
    }

    /// Weighted blend of all four scorers. Weights are validated before any scoring;
    /// `None` uses equal weights.
    pub async fn combined_score(
        &self,
        text1: &str,
        text2: &str,
        weights: Option<&SimilarityWeights>,
    ) -> Result<CombinedScore, SimilarityError> {
        let weights = weights.copied().unwrap_or_default();
        weights.validate()?;

        let character = self.character_similarity(text1, text2);
        let fuzzy = self.fuzzy_similarity(text1, text2);
        let lexical = self.lexical_similarity(text1, text2);
        let semantic = self.semantic_similarity(text1, text2).await;

        let mut diagnostics = Vec::new();
        ScoreDiagnostic::collect("character", &character, &mut diagnostics);
        ScoreDiagnostic::collect("fuzzy", &fuzzy, &mut diagnostics);
        ScoreDiagnostic::collect("lexical", &lexical, &mut diagnostics);
        ScoreDiagnostic::collect("semantic", &semantic, &mut diagnostics);
        for d in &diagnostics {
            warn!(scorer = %d.scorer, reason = %d.reason, "scorer degraded");
        }

        let components = ScoreVector {
            character: character.value(),
            fuzzy: fuzzy.value(),
            lexical: lexical.value(),
            semantic: semantic.value(),
        };
        let raw = components.character * weights.character
            + components.fuzzy * weights.fuzzy
            + components.lexical * weights.lexical
            + components.semantic * weights.semantic;
        // Float error in the weighted sum can step just outside the component range.
        let overall = raw.clamp(components.min(), components.max());

        debug!(
            overall,
            character = components.character,
            fuzzy = components.fuzzy,
            lexical = components.lexical,
            semantic = components.semantic,
            "pair scored"
        );

        Ok(CombinedScore {
            overall,
            components,
            diagnostics,
        })
    }
}
