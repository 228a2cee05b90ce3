// Model Provider Service
// Embedding and sequence-classification backends used by the semantic scorer
// and the AI-text classifier signal.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::config_store::{AppConfig, ProviderConfig};
use super::local_embedding::{LocalEmbeddingModel, LOCAL_EMBEDDING_DEFAULT_MODEL};

const EMBEDDING_DEFAULT_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";
const CLASSIFIER_DEFAULT_MODEL: &str = "roberta-base-openai-detector";
const CLASSIFIER_DEFAULT_AI_LABEL: &str = "Fake";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Model not configured: {0}")]
    Disabled(String),
    #[error("Model load failed: {0}")]
    LoadFailed(String),
    #[error("Model inference failed: {0}")]
    Inference(String),
}

// ============ Model Traits ============

/// Maps texts to fixed-size dense vectors.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Binary AI-vs-human classifier. Returns the probability of the AI class.
#[async_trait]
pub trait SequenceClassifier: Send + Sync {
    fn name(&self) -> &str;
    async fn ai_probability(&self, text: &str) -> Result<f64, ProviderError>;
}

pub type DynEmbeddingModel = Arc<dyn EmbeddingModel>;
pub type DynClassifier = Arc<dyn SequenceClassifier>;

// ============ Lazy Model Handle ============

/// One-time, concurrency-safe model initialization.
///
/// Concurrent first callers wait on a single load; a failed load is not cached,
/// so the next call retries. Once loaded the value is shared read-only.
pub struct ModelHandle<T> {
    name: String,
    cell: OnceCell<T>,
}

impl<T> ModelHandle<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<&T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.cell
            .get_or_try_init(|| async move {
                let start = Instant::now();
                let loaded = load().await;
                match &loaded {
                    Ok(_) => info!(
                        model = %self.name,
                        load_ms = start.elapsed().as_millis() as u64,
                        "model.loaded"
                    ),
                    Err(e) => warn!(model = %self.name, error = %e, "model.load_failed"),
                }
                loaded
            })
            .await
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

async fn post_json<B: Serialize>(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
) -> Result<serde_json::Value, ProviderError> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::JsonError(e.to_string()))
}

// ============ Remote Embedding Model ============

#[derive(Debug, Clone)]
struct EmbeddingEndpoint {
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Sentence-embedding model served over an OpenAI-compatible `/embeddings` endpoint.
/// The endpoint is probed once on first use.
pub struct RemoteEmbeddingModel {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    handle: ModelHandle<EmbeddingEndpoint>,
}

impl RemoteEmbeddingModel {
    pub fn new(url: &str, model: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: build_http_client(timeout_secs),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            handle: ModelHandle::new(model),
        }
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let value = post_json(&self.client, &self.url, self.api_key.as_deref(), &body).await?;
        let mut data: EmbeddingResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::JsonError(e.to_string()))?;
        data.data.sort_by_key(|d| d.index.unwrap_or(0));
        if data.data.len() != texts.len() {
            return Err(ProviderError::MissingContent);
        }
        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingModel for RemoteEmbeddingModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let endpoint = self
            .handle
            .get_or_load(|| async move {
                let probe = self.request(&["ping"]).await?;
                let dimension = probe.first().map(Vec::len).unwrap_or(0);
                if dimension == 0 {
                    return Err(ProviderError::LoadFailed("empty probe embedding".to_string()));
                }
                Ok(EmbeddingEndpoint { dimension })
            })
            .await?;

        let vectors = self.request(texts).await?;
        if vectors.iter().any(|v| v.len() != endpoint.dimension) {
            return Err(ProviderError::JsonError(format!(
                "embedding dimension mismatch, expected {}",
                endpoint.dimension
            )));
        }
        Ok(vectors)
    }
}

// ============ Disabled Embedding Model ============

/// Embedding placeholder used when local inference is switched off and no endpoint
/// is configured; always errors so the semantic scorer reports a degraded score.
pub struct DisabledEmbeddingModel;

#[async_trait]
impl EmbeddingModel for DisabledEmbeddingModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Disabled("no embedding model configured".to_string()))
    }
}

// ============ Remote Classifier ============

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct ClassifierRequest<'a> {
    inputs: &'a str,
    parameters: ClassifierParameters,
}

#[derive(Debug, Serialize)]
struct ClassifierParameters {
    truncation: bool,
    max_length: usize,
}

/// Sequence classifier served over a Hugging Face style text-classification endpoint.
pub struct RemoteClassifier {
    client: Client,
    url: String,
    model: String,
    ai_label: String,
    max_tokens: usize,
    api_key: Option<String>,
}

impl RemoteClassifier {
    pub fn new(
        url: &str,
        model: &str,
        ai_label: &str,
        max_tokens: usize,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: build_http_client(timeout_secs),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            ai_label: ai_label.to_string(),
            max_tokens,
            api_key,
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<LabelScore>, ProviderError> {
        let body = ClassifierRequest {
            inputs: text,
            parameters: ClassifierParameters {
                truncation: true,
                max_length: self.max_tokens,
            },
        };
        let value = post_json(&self.client, &self.url, self.api_key.as_deref(), &body).await?;
        parse_label_scores(value)
    }
}

#[async_trait]
impl SequenceClassifier for RemoteClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn ai_probability(&self, text: &str) -> Result<f64, ProviderError> {
        let labels = self.request(text).await?;
        ai_probability_from_labels(&labels, &self.ai_label).ok_or(ProviderError::MissingContent)
    }
}

fn parse_label_scores(value: serde_json::Value) -> Result<Vec<LabelScore>, ProviderError> {
    // Accept both `[{label, score}]` and the batched `[[{label, score}]]` shape.
    let flat = match value {
        serde_json::Value::Array(items) if items.first().map_or(false, |v| v.is_array()) => {
            items.into_iter().next().unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(flat).map_err(|e| ProviderError::JsonError(e.to_string()))
}

/// Softmax over raw logits.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return vec![];
    }
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Probability of the AI class. Scores that do not already form a distribution are
/// treated as logits. Falls back to the second label when `ai_label` is absent from
/// a two-label output. A lone top-1 label in [0,1] is a binary probability: its score
/// when it is the AI label, the complement otherwise.
fn ai_probability_from_labels(labels: &[LabelScore], ai_label: &str) -> Option<f64> {
    match labels {
        [] => return None,
        [only] if (0.0..=1.0).contains(&only.score) => {
            let p = if only.label.eq_ignore_ascii_case(ai_label) {
                only.score
            } else {
                1.0 - only.score
            };
            return Some(p);
        }
        _ => {}
    }
    let raw: Vec<f64> = labels.iter().map(|l| l.score).collect();
    let sum: f64 = raw.iter().sum();
    let is_distribution = (sum - 1.0).abs() < 1e-3 && raw.iter().all(|s| (0.0..=1.0).contains(s));
    let probs = if is_distribution { raw } else { softmax(&raw) };

    let idx = labels
        .iter()
        .position(|l| l.label.eq_ignore_ascii_case(ai_label))
        .or(if labels.len() == 2 { Some(1) } else { None })?;
    probs.get(idx).map(|p| p.clamp(0.0, 1.0))
}

// ============ Disabled Classifier ============

/// Classifier placeholder used when no endpoint is configured; always errors so the
/// caller degrades to its neutral value.
pub struct DisabledClassifier;

#[async_trait]
impl SequenceClassifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn ai_probability(&self, _text: &str) -> Result<f64, ProviderError> {
        Err(ProviderError::Disabled("no classifier endpoint configured".to_string()))
    }
}

// ============ Factories ============

fn endpoint_of(provider: &ProviderConfig) -> Option<&str> {
    if !provider.enabled {
        return None;
    }
    provider
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
}

/// Build the embedding model from config: remote when an endpoint is configured,
/// otherwise the in-process sentence-transformer (from `localDir` or the hub), or a
/// disabled model when local inference is switched off.
pub fn build_embedding_model(config: &AppConfig) -> DynEmbeddingModel {
    let models = &config.models;
    if let Some(url) = endpoint_of(&models.embedding) {
        let model = models.embedding.model.as_deref().unwrap_or(EMBEDDING_DEFAULT_MODEL);
        info!(url = %url, model = %model, "embedding.remote");
        return Arc::new(RemoteEmbeddingModel::new(
            url,
            model,
            get_api_key("embedding", &config.api_keys),
            models.timeout_secs,
        ));
    }

    if !models.local_embedding {
        warn!("embedding.disabled");
        return Arc::new(DisabledEmbeddingModel);
    }

    match &models.embedding.local_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "embedding.local");
            Arc::new(LocalEmbeddingModel::from_dir(dir))
        }
        None => {
            let model = models
                .embedding
                .model
                .as_deref()
                .unwrap_or(LOCAL_EMBEDDING_DEFAULT_MODEL);
            info!(model = %model, "embedding.local");
            Arc::new(LocalEmbeddingModel::from_hub(model))
        }
    }
}

pub fn build_classifier(config: &AppConfig) -> DynClassifier {
    let models = &config.models;
    match endpoint_of(&models.classifier) {
        Some(url) => {
            let model = models.classifier.model.as_deref().unwrap_or(CLASSIFIER_DEFAULT_MODEL);
            let ai_label = models
                .classifier
                .ai_label
                .as_deref()
                .unwrap_or(CLASSIFIER_DEFAULT_AI_LABEL);
            info!(url = %url, model = %model, "classifier.remote");
            Arc::new(RemoteClassifier::new(
                url,
                model,
                ai_label,
                config.detection.classifier_max_tokens,
                get_api_key("classifier", &config.api_keys),
                models.timeout_secs,
            ))
        }
        None => {
            info!("classifier.disabled");
            Arc::new(DisabledClassifier)
        }
    }
}

/// Get API key from environment, then from the loaded config's `apiKeys`
pub fn get_api_key(provider: &str, config_keys: &HashMap<String, String>) -> Option<String> {
    let env_keys = match provider {
        "embedding" => vec!["PLAGCHECK_EMBEDDING_API_KEY", "HF_API_TOKEN"],
        "classifier" => vec!["PLAGCHECK_CLASSIFIER_API_KEY", "HF_API_TOKEN"],
        _ => vec![],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    config_keys
        .get(provider)
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod stubs {
    use super::*;

    /// Embeds texts by topic keywords so paraphrases land on the same vector.
    pub struct TopicEmbeddingModel;

    const TOPICS: &[&[&str]] = &[
        &["machine", "learning", "ml", "ai", "artificial", "intelligence", "algorithm", "data"],
        &["climate", "warming", "carbon", "emissions", "temperature", "weather"],
        &["quantum", "qubit", "qubits", "superposition", "entanglement"],
        &["blockchain", "ledger", "cryptocurrency", "bitcoin", "block"],
    ];

    #[async_trait]
    impl EmbeddingModel for TopicEmbeddingModel {
        fn name(&self) -> &str {
            "topic-stub"
        }

        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    let words: Vec<&str> =
                        lower.split(|c: char| !c.is_alphanumeric()).collect();
                    let mut v: Vec<f32> = TOPICS
                        .iter()
                        .map(|topic| words.iter().filter(|w| topic.contains(*w)).count() as f32)
                        .collect();
                    // Unknown topics get their own axis.
                    v.push(if v.iter().all(|x| *x == 0.0) { 1.0 } else { 0.0 });
                    v
                })
                .collect())
        }
    }

    pub struct FailingEmbeddingModel;

    #[async_trait]
    impl EmbeddingModel for FailingEmbeddingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::LoadFailed("weights missing".to_string()))
        }
    }

    pub struct FixedClassifier(pub f64);

    #[async_trait]
    impl SequenceClassifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn ai_probability(&self, _text: &str) -> Result<f64, ProviderError> {
            Ok(self.0)
        }
    }
}
