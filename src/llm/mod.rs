pub mod embedder;
pub mod ollama;
pub mod provider;
pub mod types;

pub use embedder::CheckedEmbedder;
pub use ollama::OllamaProvider;
pub use provider::{EmbeddingProvider, GenerationProvider};
pub use types::{ChatMessage, Prompt};
