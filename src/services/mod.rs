// plagcheck Core Services
// Similarity scoring, AI-text detection and the analysis pipeline

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod local_embedding;
pub mod similarity;
pub mod detection;
pub mod corpus;
pub mod pipeline;

pub use config_store::{AppConfig, ConfigError, ConfigStore};
pub use corpus::{CorpusError, CorpusProvider, InMemoryCorpus};
pub use detection::AiTextDetector;
pub use pipeline::DocumentAnalyzer;
pub use local_embedding::{LocalEmbeddingModel, ModelSource};
pub use providers::{
    build_classifier,
    build_embedding_model,
    DisabledEmbeddingModel,
    EmbeddingModel,
    ModelHandle,
    ProviderError,
    SequenceClassifier,
};
pub use similarity::{FragmentMatcher, SimilarityEngine, SimilarityError};
