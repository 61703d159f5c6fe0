use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::paths::AppPaths;
use super::validation::{validate_config, ConfigError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_allowed_origins: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    /// No timeout when unset.
    pub request_timeout_secs: Option<u64>,
    pub embed_batch_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            request_timeout_secs: None,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Relative paths resolve under the data directory.
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_INDEX_DIR),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_instruction: String,
    pub no_context_answer: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            no_context_answer: DEFAULT_NO_CONTEXT_ANSWER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Disabled,
    Local,
    Memory,
    Gcs,
    S3,
}

impl FromStr for StorageBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "disabled" | "none" => Ok(Self::Disabled),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            "gcs" => Ok(Self::Gcs),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub bucket: String,
    /// Base directory holding buckets for the `local` backend.
    pub root: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub restore_on_startup: bool,
    pub backup_on_shutdown: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Disabled,
            bucket: String::new(),
            root: None,
            endpoint: None,
            region: None,
            restore_on_startup: true,
            backup_on_shutdown: true,
        }
    }
}

#[derive(Clone)]
pub struct ConfigService {
    paths: AppPaths,
}

impl ConfigService {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Loads defaults, then the YAML file, then process environment overrides.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with_env(|key| env::var(key).ok())
    }

    pub fn load_with_env<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = load_yaml_file(&self.paths.config_path)?;
        apply_env_overrides(&mut config, lookup)?;
        validate_config(&config)?;
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    serde_yaml::from_str::<AppConfig>(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid(format!("{}={}: {}", key, raw, e)))
}

fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PORT") {
        config.server.port = parse_env("PORT", &v)?;
    }
    if let Some(v) = lookup("DOCQA_HOST") {
        config.server.host = v;
    }
    if let Some(v) = lookup("OLLAMA_BASE_URL") {
        config.provider.base_url = v;
    }
    if let Some(v) = lookup("DOCQA_EMBEDDING_MODEL") {
        config.provider.embedding_model = v;
    }
    if let Some(v) = lookup("DOCQA_GENERATION_MODEL") {
        config.provider.generation_model = v;
    }
    if let Some(v) = lookup("DOCQA_REQUEST_TIMEOUT_SECS") {
        config.provider.request_timeout_secs = Some(parse_env("DOCQA_REQUEST_TIMEOUT_SECS", &v)?);
    }
    if let Some(v) = lookup("DOCQA_INDEX_DIR") {
        config.index.dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("DOCQA_CHUNK_SIZE") {
        config.chunking.chunk_size = parse_env("DOCQA_CHUNK_SIZE", &v)?;
    }
    if let Some(v) = lookup("DOCQA_CHUNK_OVERLAP") {
        config.chunking.chunk_overlap = parse_env("DOCQA_CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = lookup("DOCQA_DEFAULT_K") {
        config.retrieval.k = parse_env("DOCQA_DEFAULT_K", &v)?;
    }
    if let Some(v) = lookup("DOCQA_SCORE_THRESHOLD") {
        config.retrieval.score_threshold = parse_env("DOCQA_SCORE_THRESHOLD", &v)?;
    }
    if let Some(v) = lookup("DOCQA_STORAGE_BACKEND") {
        config.storage.backend = parse_env("DOCQA_STORAGE_BACKEND", &v)?;
    }
    if let Some(v) = lookup("DOCQA_BUCKET") {
        config.storage.bucket = v;
    }
    if let Some(v) = lookup("DOCQA_STORAGE_ROOT") {
        config.storage.root = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("DOCQA_STORAGE_ENDPOINT") {
        config.storage.endpoint = Some(v);
    }
    if let Some(v) = lookup("DOCQA_STORAGE_REGION") {
        config.storage.region = Some(v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn service_in(dir: &Path) -> ConfigService {
        ConfigService::new(AppPaths::with_data_dir(dir, dir.join("config.yml")))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = service_in(tmp.path()).load_with_env(|_| None).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.k, 5);
    }

    #[test]
    fn yaml_file_then_env_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.yml"),
            "chunking:\n  chunk_size: 300\n  chunk_overlap: 50\nstorage:\n  backend: local\n  bucket: from-yaml\n  root: /tmp/docqa-buckets\n",
        )
        .unwrap();

        let env: HashMap<&str, &str> = [("DOCQA_BUCKET", "from-env"), ("PORT", "8080")]
            .into_iter()
            .collect();
        let config = service_in(tmp.path())
            .load_with_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.chunking.chunk_size, 300);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.storage.backend, StorageBackendKind::Local);
        assert_eq!(config.storage.bucket, "from-env");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn unparsable_env_value_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = service_in(tmp.path())
            .load_with_env(|key| (key == "DOCQA_CHUNK_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("DOCQA_CHUNK_SIZE"));
    }

    #[test]
    fn overlap_not_below_chunk_size_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let err = service_in(tmp.path())
            .load_with_env(|key| match key {
                "DOCQA_CHUNK_SIZE" => Some("100".to_string()),
                "DOCQA_CHUNK_OVERLAP" => Some("100".to_string()),
                _ => None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }
}
