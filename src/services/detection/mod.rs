// Detection Module
// AI-generated text estimation organized into specialized submodules:
// - signals: perplexity proxy, burstiness and vocabulary diversity
// - patterns: stock-phrase density
// - classifier: sequence-classifier probability with neutral fallback
// - aggregation: weighted blend into an AiResult
// - confidence: probability buckets

pub mod aggregation;
pub mod classifier;
pub mod confidence;
pub mod patterns;
pub mod signals;

pub use aggregation::AiTextDetector;
pub use classifier::classifier_probability;
pub use patterns::{pattern_density, PatternCategory};
pub use signals::{burstiness, perplexity_proxy, vocabulary_diversity, PERPLEXITY_CEILING};
