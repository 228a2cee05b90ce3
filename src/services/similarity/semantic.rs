// Semantic Similarity
// Cosine between sentence embeddings produced by the injected embedding model.

use tracing::warn;

use crate::models::ScoreOutcome;
use crate::services::providers::{EmbeddingModel, ProviderError};

fn cosine_f32(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
}

/// Embed both texts in one call and score their cosine. Model failures degrade to 0.0.
pub async fn semantic_similarity(model: &dyn EmbeddingModel, text1: &str, text2: &str) -> ScoreOutcome {
    if text1.trim().is_empty() || text2.trim().is_empty() {
        return ScoreOutcome::Computed(0.0);
    }

    match model.embed(&[text1, text2]).await {
        Ok(vectors) if vectors.len() == 2 => {
            ScoreOutcome::Computed(cosine_f32(&vectors[0], &vectors[1]))
        }
        Ok(vectors) => {
            let reason = format!("embedding model returned {} vectors for 2 inputs", vectors.len());
            warn!(model = %model.name(), "{}", reason);
            ScoreOutcome::degraded(0.0, reason)
        }
        Err(e) => {
            warn!(model = %model.name(), error = %e, "semantic scorer degraded");
            let reason = match &e {
                ProviderError::Disabled(_) | ProviderError::LoadFailed(_) => {
                    format!("no embedding model: {}", e)
                }
                _ => format!("embedding model unavailable: {}", e),
            };
            ScoreOutcome::degraded(0.0, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::stubs::{FailingEmbeddingModel, TopicEmbeddingModel};
    use crate::services::providers::DisabledEmbeddingModel;

    #[test]
    fn test_cosine_f32_bounds() {
        assert_eq!(cosine_f32(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_f32(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_f32(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_f32(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_paraphrases_score_high() {
        let score = semantic_similarity(
            &TopicEmbeddingModel,
            "Machine learning lets computers learn from data.",
            "Algorithms in artificial intelligence improve with data.",
        )
        .await;
        assert!(!score.is_degraded());
        assert!(score.value() > 0.9);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_zero() {
        let score = semantic_similarity(&FailingEmbeddingModel, "some text", "other text").await;
        assert!(score.is_degraded());
        assert_eq!(score.value(), 0.0);
    }

    #[tokio::test]
    async fn test_missing_model_is_marked_degraded() {
        let score = semantic_similarity(&DisabledEmbeddingModel, "some text", "other text").await;
        assert_eq!(score.value(), 0.0);
        match score {
            ScoreOutcome::Degraded { reason, .. } => assert!(reason.starts_with("no embedding model")),
            other => panic!("expected degraded score, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input_scores_zero() {
        let score = semantic_similarity(&TopicEmbeddingModel, "", "other text").await;
        assert_eq!(score, ScoreOutcome::Computed(0.0));
    }
}
