use async_trait::async_trait;

use super::types::Prompt;
use crate::core::errors::RagError;

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// provider name for logs (e.g. "ollama")
    fn name(&self) -> &str;

    /// embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// embed many texts, output order matches input order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Maps a prompt to free-text output. One call, no streaming, no memory.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, RagError>;
}
