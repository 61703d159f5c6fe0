use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::errors::RagError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to create model provider client: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("Embedding provider probe failed: {0}")]
    EmbeddingProbe(#[source] RagError),

    #[error("Failed to initialize storage sync: {0}")]
    Storage(#[source] RagError),

    #[error("Failed to initialize RAG engine: {0}")]
    Engine(#[source] RagError),
}
