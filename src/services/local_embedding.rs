// Local Sentence Embedding
// BERT-family sentence-transformer run in-process on CPU with candle. Weights come
// from a local directory or the Hugging Face hub cache.

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::info;

use super::providers::{EmbeddingModel, ModelHandle, ProviderError};

pub const LOCAL_EMBEDDING_DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const HUB_REVISION: &str = "main";
const MAX_SEQUENCE_TOKENS: usize = 256;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Where the model files come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
    Directory(PathBuf),
    /// Hub repository id, fetched into the local hub cache on first use.
    Hub(String),
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

fn load_err(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::LoadFailed(e.to_string())
}

fn inference_err(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Inference(e.to_string())
}

fn resolve_files(source: &ModelSource) -> Result<ModelFiles, ProviderError> {
    match source {
        ModelSource::Directory(dir) => {
            let file = |name: &str| -> Result<PathBuf, ProviderError> {
                let path = dir.join(name);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ProviderError::LoadFailed(format!("missing {}", path.display())))
                }
            };
            Ok(ModelFiles {
                config: file(CONFIG_FILE)?,
                tokenizer: file(TOKENIZER_FILE)?,
                weights: file(WEIGHTS_FILE)?,
            })
        }
        ModelSource::Hub(model_id) => {
            let api = Api::new().map_err(load_err)?;
            let repo = api.repo(Repo::with_revision(
                model_id.clone(),
                RepoType::Model,
                HUB_REVISION.to_string(),
            ));
            Ok(ModelFiles {
                config: repo.get(CONFIG_FILE).map_err(load_err)?,
                tokenizer: repo.get(TOKENIZER_FILE).map_err(load_err)?,
                weights: repo.get(WEIGHTS_FILE).map_err(load_err)?,
            })
        }
    }
}

/// Loaded tokenizer and encoder. Immutable after load, shared across tasks.
pub struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEncoder {
    /// Blocking: reads (and possibly downloads) the weights.
    pub fn load(source: &ModelSource) -> Result<Self, ProviderError> {
        let files = resolve_files(source)?;
        let device = Device::Cpu;

        let config: BertConfig =
            serde_json::from_str(&fs::read_to_string(&files.config).map_err(load_err)?)
                .map_err(load_err)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(load_err)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(load_err)?;

        let weights = fs::read(&files.weights).map_err(load_err)?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DTYPE, &device).map_err(load_err)?;
        let model = BertModel::load(vb, &config).map_err(load_err)?;

        Ok(Self { model, tokenizer, device })
    }

    /// Mean-pooled, L2-normalized embeddings, one row per text.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self.tokenizer.encode_batch(inputs, true).map_err(inference_err)?;

        let ids = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(inference_err)?;
        let masks = encodings
            .iter()
            .map(|e| Tensor::new(e.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(inference_err)?;

        self.pool(&ids, &masks).map_err(inference_err)
    }

    fn pool(&self, ids: &[Tensor], masks: &[Tensor]) -> candle_core::Result<Vec<Vec<f32>>> {
        let input_ids = Tensor::stack(ids, 0)?;
        let attention_mask = Tensor::stack(masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        // (batch, seq, hidden)
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Padding positions are excluded from the mean.
        let mask = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        pooled.broadcast_div(&norms)?.to_vec2::<f32>()
    }
}

/// In-process sentence-transformer. The encoder is loaded once on first use;
/// encoding runs on the blocking pool.
pub struct LocalEmbeddingModel {
    name: String,
    source: ModelSource,
    handle: ModelHandle<Arc<SentenceEncoder>>,
}

impl LocalEmbeddingModel {
    pub fn new(source: ModelSource) -> Self {
        let name = match &source {
            ModelSource::Directory(dir) => dir.display().to_string(),
            ModelSource::Hub(id) => id.clone(),
        };
        Self {
            handle: ModelHandle::new(name.clone()),
            name,
            source,
        }
    }

    pub fn from_hub(model_id: &str) -> Self {
        Self::new(ModelSource::Hub(model_id.to_string()))
    }

    pub fn from_dir(dir: &Path) -> Self {
        Self::new(ModelSource::Directory(dir.to_path_buf()))
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    async fn encoder(&self) -> Result<Arc<SentenceEncoder>, ProviderError> {
        let encoder = self
            .handle
            .get_or_load(|| async move {
                let source = self.source.clone();
                info!(model = %self.name, "embedding.local_loading");
                match tokio::task::spawn_blocking(move || SentenceEncoder::load(&source)).await {
                    Ok(loaded) => loaded.map(Arc::new),
                    Err(e) => Err(load_err(e)),
                }
            })
            .await?;
        Ok(Arc::clone(encoder))
    }
}

#[async_trait]
impl EmbeddingModel for LocalEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let encoder = self.encoder().await?;
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        match tokio::task::spawn_blocking(move || encoder.encode(&owned)).await {
            Ok(vectors) => vectors,
            Err(e) => Err(inference_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_source_reports_missing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        let err = resolve_files(&ModelSource::Directory(dir.path().to_path_buf()))
            .err()
            .unwrap();
        match err {
            ProviderError::LoadFailed(msg) => assert!(msg.contains(TOKENIZER_FILE)),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_model_fails_and_is_retried() {
        let dir = tempdir().unwrap();
        let model = LocalEmbeddingModel::from_dir(&dir.path().join("absent"));
        assert!(model.embed(&["a", "b"]).await.is_err());
        assert!(!model.handle.is_loaded());
        assert!(model.embed(&["a", "b"]).await.is_err());
    }

    #[test]
    fn test_name_follows_source() {
        let model = LocalEmbeddingModel::from_hub(LOCAL_EMBEDDING_DEFAULT_MODEL);
        assert_eq!(model.name(), LOCAL_EMBEDDING_DEFAULT_MODEL);
        assert_eq!(
            model.source(),
            &ModelSource::Hub(LOCAL_EMBEDDING_DEFAULT_MODEL.to_string())
        );
    }
}
