// Document Analysis Pipeline
// Scores a document against the reference corpus, locates matching fragments and
// estimates AI likelihood. Always returns a well-formed result.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::config_store::{AppConfig, DetectionConfig, SimilarityConfig};
use super::corpus::CorpusProvider;
use super::detection::AiTextDetector;
use super::providers::{build_classifier, build_embedding_model, DynClassifier, DynEmbeddingModel};
use super::similarity::{FragmentMatcher, SimilarityEngine, SimilarityError};
use super::text_processor::normalize;
use crate::models::{round3, AnalysisResult, AnalyzeRequest, ScoreVector, SourceRef};

pub const DEFAULT_TITLE: &str = "Untitled Document";
const DEFAULT_BATCH_CONCURRENCY: usize = 4;

#[derive(Clone)]
pub struct DocumentAnalyzer {
    engine: SimilarityEngine,
    matcher: FragmentMatcher,
    detector: AiTextDetector,
    corpus: Arc<dyn CorpusProvider>,
    similarity: SimilarityConfig,
    min_text_chars: usize,
    max_concurrency: usize,
    deadline: Option<Duration>,
}

impl DocumentAnalyzer {
    /// Weights are validated here so a bad configuration never reaches scoring.
    pub fn new(
        embedder: DynEmbeddingModel,
        classifier: DynClassifier,
        corpus: Arc<dyn CorpusProvider>,
        similarity: SimilarityConfig,
        detection: DetectionConfig,
    ) -> Result<Self, SimilarityError> {
        similarity.weights.validate()?;

        let engine = SimilarityEngine::new(embedder);
        let matcher = FragmentMatcher::new(engine.clone())
            .with_threshold(similarity.fragment_threshold)
            .with_fragment_size(similarity.fragment_size)
            .with_weights(similarity.weights);
        let min_text_chars = detection.min_text_chars;
        let detector = AiTextDetector::new(classifier, detection);

        Ok(Self {
            engine,
            matcher,
            detector,
            corpus,
            similarity,
            min_text_chars,
            max_concurrency: DEFAULT_BATCH_CONCURRENCY,
            deadline: None,
        })
    }

    /// Build models from config and wire them to `corpus`.
    pub fn from_config(config: &AppConfig, corpus: Arc<dyn CorpusProvider>) -> Result<Self, SimilarityError> {
        let embedder = build_embedding_model(config);
        let classifier = build_classifier(config);
        let analyzer = Self::new(
            embedder,
            classifier,
            corpus,
            config.similarity.clone(),
            config.detection.clone(),
        )?;
        Ok(analyzer
            .with_max_concurrency(config.pipeline.max_concurrency)
            .with_deadline(config.pipeline.deadline_secs.map(Duration::from_secs)))
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    /// Analyze one document. Failures are reported in `error`, never raised.
    pub async fn analyze(&self, request: AnalyzeRequest) -> AnalysisResult {
        let start = Instant::now();
        let (doc_id, title) = resolve_identity(&request);

        match self.analyze_inner(&doc_id, &title, &request.text, start).await {
            Ok(result) => {
                info!(
                    doc_id = %result.doc_id,
                    similarity = result.similarity,
                    ai_probability = result.ai_detection.probability,
                    fragments = result.fragments.len(),
                    elapsed_ms = result.processing_time_ms,
                    "[PIPELINE] analysis done"
                );
                result
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "[PIPELINE] analysis failed");
                AnalysisResult::failed(doc_id, title, e, elapsed_ms(start))
            }
        }
    }

    async fn analyze_inner(
        &self,
        doc_id: &str,
        title: &str,
        text: &str,
        start: Instant,
    ) -> Result<AnalysisResult, String> {
        if text.trim().is_empty() {
            return Err("No text provided".to_string());
        }
        let normalized = normalize(text, false);
        if normalized.chars().count() < self.min_text_chars {
            return Err("Text too short for analysis".to_string());
        }

        let normalized_corpus: Vec<String> = self
            .corpus
            .all_texts()
            .iter()
            .map(|t| normalize(t, false))
            .collect();
        let metadata = self.corpus.metadata();

        // Whole-document score against every reference text.
        let mut per_source: Vec<f64> = Vec::with_capacity(normalized_corpus.len());
        let mut best = 0.0;
        let mut best_components = ScoreVector::zero();
        for reference in &normalized_corpus {
            let combined = self
                .engine
                .combined_score(&normalized, reference, Some(&self.similarity.weights))
                .await
                .map_err(|e| e.to_string())?;
            if combined.overall > best {
                best = combined.overall;
                best_components = combined.components;
            }
            per_source.push(combined.overall);
        }

        let ai_detection = self.detector.detect(text).await;

        let corpus_refs: Vec<&str> = normalized_corpus.iter().map(String::as_str).collect();
        let mut fragments = self
            .matcher
            .find_matching_fragments(&normalized, &corpus_refs)
            .await
            .map_err(|e| e.to_string())?;
        fragments.truncate(self.similarity.max_fragments);
        for fragment in &mut fragments {
            fragment.score = round3(fragment.score);
            if let Some(meta) = fragment
                .source_index
                .checked_sub(1)
                .and_then(|idx| metadata.get(idx))
            {
                fragment.source_title = Some(meta.title.clone());
                fragment.source_url = Some(meta.url.clone());
            }
        }

        let sources = if best > self.similarity.source_threshold {
            top_sources(&per_source, &metadata, self.similarity.max_sources)
        } else {
            Vec::new()
        };

        Ok(AnalysisResult {
            doc_id: doc_id.to_string(),
            title: title.to_string(),
            similarity: round3(best),
            sources,
            processing_time_ms: elapsed_ms(start),
            fragments,
            explain: best_components.rounded(),
            ai_detection,
            error: None,
        })
    }

    /// Analyze under a wall-clock budget; running out of time yields an error result.
    pub async fn analyze_with_deadline(
        &self,
        mut request: AnalyzeRequest,
        deadline: Option<Duration>,
    ) -> AnalysisResult {
        let Some(budget) = deadline else {
            return self.analyze(request).await;
        };

        let start = Instant::now();
        let (doc_id, title) = resolve_identity(&request);
        request.doc_id = Some(doc_id.clone());

        match tokio::time::timeout(budget, self.analyze(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(doc_id = %doc_id, budget_ms = budget.as_millis() as u64, "[PIPELINE] deadline exceeded");
                AnalysisResult::failed(
                    doc_id,
                    title,
                    format!("Analysis timed out after {} ms", budget.as_millis()),
                    elapsed_ms(start),
                )
            }
        }
    }

    /// Analyze documents concurrently, bounded by `max_concurrency`. Results come
    /// back in input order.
    pub async fn analyze_batch(&self, requests: Vec<AnalyzeRequest>) -> Vec<AnalysisResult> {
        let started = Instant::now();
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set: JoinSet<(usize, AnalysisResult)> = JoinSet::new();
        let mut identities = Vec::with_capacity(total);

        for (idx, mut request) in requests.into_iter().enumerate() {
            let (doc_id, title) = resolve_identity(&request);
            request.doc_id = Some(doc_id.clone());
            identities.push((doc_id, title));

            let analyzer = self.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // The semaphore is never closed, so acquire only fails after shutdown.
                let _permit = semaphore.acquire_owned().await.ok();
                let result = analyzer.analyze_with_deadline(request, analyzer.deadline).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<AnalysisResult>> = (0..total).map(|_| None).collect();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!("[PIPELINE] analysis task failed: {}", e),
            }
        }

        info!(
            "[PIPELINE] batch done: documents={}, elapsed_ms={}",
            total,
            started.elapsed().as_millis()
        );

        slots
            .into_iter()
            .zip(identities)
            .map(|(slot, (doc_id, title))| {
                slot.unwrap_or_else(|| AnalysisResult::failed(doc_id, title, "Analysis task failed", 0))
            })
            .collect()
    }
}

fn resolve_identity(request: &AnalyzeRequest) -> (String, String) {
    let doc_id = request
        .doc_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let title = request
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    (doc_id, title)
}

/// Indices of the `limit` best-scoring references; ties keep corpus order.
fn top_sources(scores: &[f64], metadata: &[SourceRef], limit: usize) -> Vec<SourceRef> {
    let mut ranked: Vec<usize> = (0..scores.len().min(metadata.len())).collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    ranked
        .into_iter()
        .take(limit)
        .map(|idx| metadata[idx].clone())
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimilarityWeights;
    use crate::services::corpus::InMemoryCorpus;
    use crate::services::providers::stubs::{FixedClassifier, TopicEmbeddingModel};
    use crate::services::providers::{EmbeddingModel, ProviderError};
    use async_trait::async_trait;

    fn analyzer() -> DocumentAnalyzer {
        DocumentAnalyzer::new(
            Arc::new(TopicEmbeddingModel),
            Arc::new(FixedClassifier(0.5)),
            Arc::new(InMemoryCorpus::sample()),
            SimilarityConfig::default(),
            DetectionConfig::default(),
        )
        .unwrap()
    }

    fn request(text: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            doc_id: None,
            title: None,
            text: text.to_string(),
        }
    }

    const UNRELATED: &str = "Slice the onions thinly and fry them slowly in butter until golden. \
        Add a pinch of salt, a splash of stock and let the pan simmer while you grate the cheese \
        for the soup that will be served with toasted bread.";

    #[tokio::test]
    async fn test_short_text_yields_error_result() {
        let result = analyzer().analyze(request("too short")).await;
        assert_eq!(result.error.as_deref(), Some("Text too short for analysis"));
        assert_eq!(result.similarity, 0.0);
        assert!(result.fragments.is_empty());
        assert_eq!(result.explain, ScoreVector::zero());
    }

    #[tokio::test]
    async fn test_empty_text_yields_error_result() {
        let result = analyzer().analyze(request("   ")).await;
        assert_eq!(result.error.as_deref(), Some("No text provided"));
    }

    #[tokio::test]
    async fn test_identity_defaults() {
        let result = analyzer().analyze(request("short")).await;
        assert_eq!(result.title, DEFAULT_TITLE);
        assert!(Uuid::parse_str(&result.doc_id).is_ok());
    }

    #[tokio::test]
    async fn test_copied_reference_is_detected() {
        let corpus = InMemoryCorpus::sample();
        let copied = corpus.all_texts()[0].to_string();
        let result = analyzer()
            .analyze(AnalyzeRequest {
                doc_id: Some("doc-1".into()),
                title: Some("Essay".into()),
                text: copied,
            })
            .await;

        assert!(result.error.is_none());
        assert_eq!(result.doc_id, "doc-1");
        assert!(result.similarity >= 0.95, "similarity {}", result.similarity);
        assert_eq!(result.sources[0].title, "Machine Learning Fundamentals");
        assert!(result.sources.len() <= 3);
        assert!(!result.fragments.is_empty() && result.fragments.len() <= 5);
        let top = &result.fragments[0];
        assert_eq!(top.source_index, 1);
        assert_eq!(top.source_title.as_deref(), Some("Machine Learning Fundamentals"));
        assert_eq!(top.source_url.as_deref(), Some("https://academic.example.com/ml-fundamentals"));
    }

    #[tokio::test]
    async fn test_unrelated_text_has_no_sources() {
        let result = analyzer().analyze(request(UNRELATED)).await;
        assert!(result.error.is_none());
        assert!(result.similarity <= 0.3, "similarity {}", result.similarity);
        assert!(result.sources.is_empty());
        assert!(result.fragments.is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let corpus = InMemoryCorpus::sample();
        let texts = corpus.all_texts();
        let requests: Vec<AnalyzeRequest> = ["a", "b", "c", "d"]
            .iter()
            .zip([texts[3], "tiny", UNRELATED, texts[1]])
            .map(|(id, text)| AnalyzeRequest {
                doc_id: Some(id.to_string()),
                title: None,
                text: text.to_string(),
            })
            .collect();

        let results = analyzer().with_max_concurrency(2).analyze_batch(requests).await;
        let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(results[1].error.is_some());
        assert_eq!(results[3].sources[0].title, "Climate Change and Global Warming");
    }

    struct SlowEmbeddingModel;

    #[async_trait]
    impl EmbeddingModel for SlowEmbeddingModel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout_result() {
        let analyzer = DocumentAnalyzer::new(
            Arc::new(SlowEmbeddingModel),
            Arc::new(FixedClassifier(0.5)),
            Arc::new(InMemoryCorpus::sample()),
            SimilarityConfig::default(),
            DetectionConfig::default(),
        )
        .unwrap();
        let result = analyzer
            .analyze_with_deadline(request(UNRELATED), Some(Duration::from_millis(20)))
            .await;
        let error = result.error.unwrap_or_default();
        assert!(error.contains("timed out"), "error {error}");
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_invalid_weights_rejected_at_construction() {
        let similarity = SimilarityConfig {
            weights: SimilarityWeights {
                character: 0.4,
                fuzzy: 0.4,
                lexical: 0.4,
                semantic: 0.4,
            },
            ..SimilarityConfig::default()
        };
        let result = DocumentAnalyzer::new(
            Arc::new(TopicEmbeddingModel),
            Arc::new(FixedClassifier(0.5)),
            Arc::new(InMemoryCorpus::sample()),
            similarity,
            DetectionConfig::default(),
        );
        assert!(matches!(result, Err(SimilarityError::WeightSum(_))));
    }

    #[test]
    fn test_top_sources_ranked_by_score() {
        let meta: Vec<SourceRef> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| SourceRef {
                title: t.to_string(),
                url: format!("https://{}.example", t),
            })
            .collect();
        let top = top_sources(&[0.1, 0.9, 0.5, 0.9], &meta, 3);
        let titles: Vec<&str> = top.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "c"]);
    }
}
