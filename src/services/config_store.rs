// Configuration Storage Service
// Handles config file read/write, env overrides and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::SimilarityWeights;

const CONFIG_VERSION: &str = "1.0.0";
const BACKUPS_KEPT: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O failed ({context}): {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn io_err(context: &'static str) -> impl FnOnce(std::io::Error) -> ConfigError {
    move |source| ConfigError::Io { context, source }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// JSON file of `[{id, title, url, text}]`; the built-in sample corpus when unset.
    #[serde(default)]
    pub corpus_file: Option<PathBuf>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            similarity: SimilarityConfig::default(),
            detection: DetectionConfig::default(),
            models: ModelsConfig::default(),
            pipeline: PipelineConfig::default(),
            corpus_file: None,
            api_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityConfig {
    #[serde(default)]
    pub weights: SimilarityWeights,
    #[serde(default = "default_fragment_threshold")]
    pub fragment_threshold: f64,
    #[serde(default = "default_fragment_size")]
    pub fragment_size: usize,
    #[serde(default = "default_source_threshold")]
    pub source_threshold: f64,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            weights: SimilarityWeights::default(),
            fragment_threshold: default_fragment_threshold(),
            fragment_size: default_fragment_size(),
            source_threshold: default_source_threshold(),
            max_sources: default_max_sources(),
            max_fragments: default_max_fragments(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    /// Trimmed texts shorter than this are not scored.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    #[serde(default = "default_classifier_max_tokens")]
    pub classifier_max_tokens: usize,
    #[serde(default = "default_perplexity_ceiling")]
    pub perplexity_ceiling: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: default_min_text_chars(),
            classifier_max_tokens: default_classifier_max_tokens(),
            perplexity_ceiling: default_perplexity_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsConfig {
    #[serde(default)]
    pub embedding: ProviderConfig,
    #[serde(default)]
    pub classifier: ProviderConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Run the sentence-transformer in-process when no embedding endpoint is set.
    #[serde(default = "default_local_embedding")]
    pub local_embedding: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            embedding: ProviderConfig::default(),
            classifier: ProviderConfig::default(),
            timeout_secs: default_timeout_secs(),
            local_embedding: default_local_embedding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub ai_label: Option<String>,
    /// Local model directory (`config.json`, `tokenizer.json`, `model.safetensors`).
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-document wall-clock budget; unbounded when unset.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            deadline_secs: None,
        }
    }
}

fn default_version() -> String { CONFIG_VERSION.to_string() }
fn default_fragment_threshold() -> f64 { 0.65 }
fn default_fragment_size() -> usize { 100 }
fn default_source_threshold() -> f64 { 0.3 }
fn default_max_sources() -> usize { 3 }
fn default_max_fragments() -> usize { 5 }
fn default_min_text_chars() -> usize { 50 }
fn default_classifier_max_tokens() -> usize { 512 }
fn default_perplexity_ceiling() -> f64 { 100.0 }
fn default_timeout_secs() -> u64 { 60 }
fn default_local_embedding() -> bool { true }
fn default_max_concurrency() -> usize { 4 }

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Model settings from the environment take precedence over the file. Endpoint
    /// URLs also enable their provider.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_value("PLAGCHECK_EMBEDDING_URL") {
            self.models.embedding.base_url = Some(url);
            self.models.embedding.enabled = true;
        }
        if let Some(url) = env_value("PLAGCHECK_CLASSIFIER_URL") {
            self.models.classifier.base_url = Some(url);
            self.models.classifier.enabled = true;
        }
        if let Some(dir) = env_value("PLAGCHECK_EMBEDDING_MODEL_DIR") {
            self.models.embedding.local_dir = Some(PathBuf::from(dir));
        }
        if matches!(
            env_value("PLAGCHECK_DISABLE_LOCAL_EMBEDDING").as_deref(),
            Some("1") | Some("true") | Some("TRUE")
        ) {
            self.models.local_embedding = false;
        }
        self
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("plagcheck"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(io_err("create config dir"))
    }

    /// Load configuration from file, or defaults when there is none
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(io_err("read config"))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content).map_err(io_err("write config"))
    }

    fn backup_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir).map_err(io_err("create backup dir"))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let mut backup_file = backup_dir.join(format!("config_{}.json", timestamp));
        let mut n = 1;
        while backup_file.exists() {
            backup_file = backup_dir.join(format!("config_{}_{}.json", timestamp, n));
            n += 1;
        }

        fs::copy(&self.config_file, &backup_file).map_err(io_err("create backup"))?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_KEPT)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(io_err("read backup dir"))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first; names carry the timestamp so they break mtime ties.
        entries.sort_by_key(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            (modified, e.file_name())
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn list_backups(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let dir = self.backup_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(io_err("read backup dir"))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete provider API key from config file
    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.similarity.weights, SimilarityWeights::default());
        assert_eq!(config.similarity.fragment_threshold, 0.65);
        assert_eq!(config.similarity.max_sources, 3);
        assert_eq!(config.detection.classifier_max_tokens, 512);
        assert!(!config.models.embedding.enabled);
        assert!(config.models.local_embedding);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"similarity": {"fragmentThreshold": 0.8}, "models": {"embedding": {"enabled": true, "baseUrl": "http://localhost:8080/embed"}}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.similarity.fragment_threshold, 0.8);
        assert_eq!(config.similarity.fragment_size, 100);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(
            config.models.embedding.base_url.as_deref(),
            Some("http://localhost:8080/embed")
        );
        assert_eq!(config.models.timeout_secs, 60);
        assert!(config.models.local_embedding);
        assert_eq!(config.models.embedding.local_dir, None);
    }

    #[test]
    fn test_local_model_settings_parse() {
        let json = r#"{"models": {"localEmbedding": false, "embedding": {"localDir": "/models/minilm"}}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert!(!config.models.local_embedding);
        assert_eq!(
            config.models.embedding.local_dir,
            Some(PathBuf::from("/models/minilm"))
        );
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested"));
        let config = store.load().unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let mut config = AppConfig::default();
        config.similarity.fragment_size = 250;
        config.corpus_file = Some(PathBuf::from("/data/corpus.json"));
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.similarity.fragment_size, 250);
        assert_eq!(loaded.corpus_file, Some(PathBuf::from("/data/corpus.json")));
    }

    #[test]
    fn test_backups_are_pruned() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let config = AppConfig::default();
        for _ in 0..14 {
            store.save(&config).unwrap();
        }
        assert_eq!(store.list_backups().unwrap().len(), BACKUPS_KEPT);
    }

    #[test]
    fn test_api_key_set_get_delete() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        store.set_api_key("embedding", "sk-test").unwrap();
        assert_eq!(store.get_api_key("embedding").unwrap().as_deref(), Some("sk-test"));
        store.delete_api_key("embedding").unwrap();
        assert_eq!(store.get_api_key("embedding").unwrap(), None);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        fs::write(store.config_file(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(ConfigError::Parse(_))));
    }
}
