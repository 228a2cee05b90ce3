// Classifier Signal
// Probability of the AI class from the injected sequence classifier

use tracing::warn;

use crate::models::ScoreOutcome;
use crate::services::providers::SequenceClassifier;
use crate::services::text_processor::truncate_tokens;

/// Neutral probability used when the classifier cannot produce one.
pub const CLASSIFIER_NEUTRAL: f64 = 0.5;

/// Classify the first `max_tokens` tokens. Load and inference failures degrade to 0.5.
pub async fn classifier_probability(
    classifier: &dyn SequenceClassifier,
    text: &str,
    max_tokens: usize,
) -> ScoreOutcome {
    let input = truncate_tokens(text, max_tokens);
    match classifier.ai_probability(input).await {
        Ok(p) if p.is_finite() => ScoreOutcome::Computed(p.clamp(0.0, 1.0)),
        Ok(p) => {
            warn!(model = %classifier.name(), value = p, "classifier returned non-finite probability");
            ScoreOutcome::degraded(CLASSIFIER_NEUTRAL, "classifier returned non-finite probability")
        }
        Err(e) => {
            warn!(model = %classifier.name(), error = %e, "classifier degraded");
            ScoreOutcome::degraded(CLASSIFIER_NEUTRAL, format!("classifier unavailable: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::stubs::FixedClassifier;
    use crate::services::providers::{DisabledClassifier, ProviderError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingClassifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SequenceClassifier for RecordingClassifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn ai_probability(&self, text: &str) -> Result<f64, ProviderError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(0.9)
        }
    }

    #[tokio::test]
    async fn test_input_is_truncated() {
        let classifier = RecordingClassifier { seen: Mutex::new(vec![]) };
        let text = "tok ".repeat(1000);
        let out = classifier_probability(&classifier, &text, 512).await;
        assert_eq!(out, ScoreOutcome::Computed(0.9));
        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen[0].split_whitespace().count(), 512);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_neutral() {
        let out = classifier_probability(&DisabledClassifier, "some text", 512).await;
        assert!(out.is_degraded());
        assert_eq!(out.value(), 0.5);
    }

    #[tokio::test]
    async fn test_out_of_range_probability_is_clamped() {
        let out = classifier_probability(&FixedClassifier(1.3), "text", 512).await;
        assert_eq!(out, ScoreOutcome::Computed(1.0));
        let nan = classifier_probability(&FixedClassifier(f64::NAN), "text", 512).await;
        assert!(nan.is_degraded());
    }
}
