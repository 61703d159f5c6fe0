use thiserror::Error;

use super::service::{AppConfig, StorageBackendKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn invalid(field: &str, detail: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid(format!("{} {}", field, detail))
}

fn validate_range(field: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(invalid(
            field,
            format!("must be between {} and {} (got {})", min, max, value),
        ));
    }
    Ok(())
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port", "must not be 0"));
    }
    validate_range(
        "server.max_upload_bytes",
        config.server.max_upload_bytes,
        1,
        1_000_000_000,
    )?;

    validate_non_empty("provider.base_url", &config.provider.base_url)?;
    validate_non_empty("provider.embedding_model", &config.provider.embedding_model)?;
    validate_non_empty("provider.generation_model", &config.provider.generation_model)?;
    validate_range(
        "provider.embed_batch_size",
        config.provider.embed_batch_size,
        1,
        4_096,
    )?;
    if config.provider.request_timeout_secs == Some(0) {
        return Err(invalid("provider.request_timeout_secs", "must be positive"));
    }

    if config.index.dir.as_os_str().is_empty() {
        return Err(invalid("index.dir", "must not be empty"));
    }

    validate_range("chunking.chunk_size", config.chunking.chunk_size, 1, 1_000_000)?;
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(invalid(
            "chunking.chunk_overlap",
            format!(
                "must be less than chunking.chunk_size ({} >= {})",
                config.chunking.chunk_overlap, config.chunking.chunk_size
            ),
        ));
    }

    validate_range("retrieval.k", config.retrieval.k, 1, 1_000)?;
    let threshold = config.retrieval.score_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid(
            "retrieval.score_threshold",
            format!("must be within [0, 1] (got {})", threshold),
        ));
    }

    validate_non_empty("prompt.system_instruction", &config.prompt.system_instruction)?;
    validate_non_empty("prompt.no_context_answer", &config.prompt.no_context_answer)?;

    if config.storage.backend != StorageBackendKind::Disabled {
        validate_non_empty("storage.bucket", &config.storage.bucket)?;
        if config.storage.bucket.contains('/') {
            return Err(invalid("storage.bucket", "must not contain '/'"));
        }
    }
    if config.storage.backend == StorageBackendKind::Local && config.storage.root.is_none() {
        return Err(invalid("storage.root", "is required for the local backend"));
    }

    Ok(())
}
