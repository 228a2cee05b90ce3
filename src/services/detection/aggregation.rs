// Aggregation Logic
// Blends the five AI-likelihood signals into one probability and confidence bucket

use tracing::debug;

use super::classifier::classifier_probability;
use super::patterns::pattern_density;
use super::signals::{burstiness, perplexity_proxy, vocabulary_diversity};
use crate::models::{AiResult, AiScoreVector, ConfidenceLevel, ScoreDiagnostic};
use crate::services::config_store::DetectionConfig;
use crate::services::providers::DynClassifier;

const PERPLEXITY_WEIGHT: f64 = 0.15;
const BURSTINESS_WEIGHT: f64 = 0.15;
const PATTERN_WEIGHT: f64 = 0.15;
const VOCABULARY_WEIGHT: f64 = 0.15;
const CLASSIFIER_WEIGHT: f64 = 0.40;

/// Multi-signal AI-text estimator.
///
/// Component scores in the result are oriented so that higher means more
/// machine-like: perplexity and burstiness are inverted before blending.
#[derive(Clone)]
pub struct AiTextDetector {
    classifier: DynClassifier,
    config: DetectionConfig,
}

impl AiTextDetector {
    pub fn new(classifier: DynClassifier, config: DetectionConfig) -> Self {
        Self { classifier, config }
    }

    pub async fn detect(&self, text: &str) -> AiResult {
        if text.trim().chars().count() < self.config.min_text_chars {
            return AiResult::empty();
        }

        let ceiling = self.config.perplexity_ceiling.max(f64::EPSILON);
        let perplexity = perplexity_proxy(text, ceiling);
        let scores_without_classifier = AiScoreVector {
            perplexity_proxy: ((ceiling - perplexity) / ceiling).max(0.0),
            burstiness: 1.0 - burstiness(text),
            pattern_density: pattern_density(text),
            vocabulary_diversity: vocabulary_diversity(text),
            classifier_probability: 0.0,
        };

        let classifier =
            classifier_probability(self.classifier.as_ref(), text, self.config.classifier_max_tokens).await;
        let mut diagnostics = Vec::new();
        ScoreDiagnostic::collect("classifier", &classifier, &mut diagnostics);

        let scores = AiScoreVector {
            classifier_probability: classifier.value(),
            ..scores_without_classifier
        };
        let probability = (scores.perplexity_proxy * PERPLEXITY_WEIGHT
            + scores.burstiness * BURSTINESS_WEIGHT
            + scores.pattern_density * PATTERN_WEIGHT
            + scores.vocabulary_diversity * VOCABULARY_WEIGHT
            + scores.classifier_probability * CLASSIFIER_WEIGHT)
            .clamp(0.0, 1.0);
        let confidence = ConfidenceLevel::from_probability(probability);

        debug!(
            probability,
            confidence = %confidence,
            degraded = !diagnostics.is_empty(),
            "ai detection done"
        );

        AiResult {
            probability,
            confidence,
            confidence_description: confidence.description().to_string(),
            scores,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::stubs::FixedClassifier;
    use crate::services::providers::DisabledClassifier;
    use std::sync::Arc;

    const HUMAN_TEXT: &str = "I went down to the market on Tuesday. Rain. The stall that sells \
        old maps had moved again, and the owner, who never remembers me, swore it had always been \
        by the fountain. Odd.";
    const AI_TEXT: &str = "It is important to note that machine learning is a powerful tool. \
        Furthermore, it enables systems to learn from data. Additionally, it improves over time. \
        In conclusion, machine learning is transforming many industries.";

    fn detector(classifier: DynClassifier) -> AiTextDetector {
        AiTextDetector::new(classifier, DetectionConfig::default())
    }

    #[tokio::test]
    async fn test_short_text_short_circuits() {
        let d = detector(Arc::new(FixedClassifier(0.99)));
        for text in ["", "   ", "Too short to judge anything at all."] {
            let r = d.detect(text).await;
            assert_eq!(r.probability, 0.0);
            assert_eq!(r.scores, AiScoreVector::default());
            assert_eq!(r.confidence, ConfidenceLevel::VeryLow);
        }
    }

    #[tokio::test]
    async fn test_probability_is_the_weighted_blend() {
        let r = detector(Arc::new(FixedClassifier(0.7))).detect(AI_TEXT).await;
        let s = r.scores;
        let expected = 0.15 * s.perplexity_proxy
            + 0.15 * s.burstiness
            + 0.15 * s.pattern_density
            + 0.15 * s.vocabulary_diversity
            + 0.40 * 0.7;
        assert!((r.probability - expected).abs() < 1e-12);
        assert_eq!(r.confidence, ConfidenceLevel::from_probability(r.probability));
        assert!(r.diagnostics.is_empty());
        for v in [s.perplexity_proxy, s.burstiness, s.pattern_density, s.vocabulary_diversity] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[tokio::test]
    async fn test_stock_phrasing_raises_pattern_score() {
        let d = detector(Arc::new(FixedClassifier(0.5)));
        let ai = d.detect(AI_TEXT).await;
        let human = d.detect(HUMAN_TEXT).await;
        assert!(ai.scores.pattern_density > human.scores.pattern_density);
        assert!(ai.probability > human.probability);
    }

    #[tokio::test]
    async fn test_missing_classifier_degrades_to_neutral() {
        let r = detector(Arc::new(DisabledClassifier)).detect(AI_TEXT).await;
        assert_eq!(r.scores.classifier_probability, 0.5);
        assert_eq!(r.diagnostics.len(), 1);
        assert_eq!(r.diagnostics[0].scorer, "classifier");
    }
}
